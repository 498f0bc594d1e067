//! Session store (§3 "Session store contract", §5 "Shared resources").
//!
//! `SessionState` (§3) is owned exclusively by whichever backend implements
//! [`SessionStore`] between a session's `open` and `close`. The trait is the
//! single seam the agent graph calls through — `get`, `put`, `delete`,
//! `lock`/`unlock` — so the engine never cares whether a session lives in a
//! process-local map, Redis, or a SQL table (§5 "the engine only calls
//! `lock/get/put/unlock`").
//!
//! Shaped after `AnalysisStorage` (sled-backed, timestamp-keyed append
//! store for drilling health assessments): the same open/insert/get
//! pattern is generalised here from an append-only history to a
//! session-id-keyed read-modify-write store, and [`ProcessLock`]
//! (`lockfile`) is kept as the single-process guard for the sled backend.
//! The in-memory backend is the default (§6 `SESSION_STORE_BACKEND=memory`);
//! Redis and SQL are optional backends behind the `session-redis`/
//! `session-sql` features, using the same crates already carried for
//! those roles.

pub mod lockfile;

pub use lockfile::ProcessLock;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::types::SessionState;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session not found")]
    NotFound,
    #[error("session is busy (a turn is already in flight)")]
    SessionBusy,
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// An exclusive per-session lock handle (§3 "lock(id) -> handle", §5
/// "either hold an exclusive per-session lock across the entire turn").
/// Dropping the handle without calling [`SessionStore::unlock`] releases
/// the lock (RAII) — the same release-on-drop shape as [`ProcessLock`],
/// one level down at session granularity instead of process granularity.
pub struct LockHandle {
    session_id: String,
    _guard: LockGuard,
}

/// What actually releases a lock when its [`LockHandle`] is dropped.
/// `Local` covers the in-memory/sled backends (a process-local mutex);
/// `Sql` runs `pg_advisory_unlock` for the SQL backend, the cross-process
/// equivalent of the "`SELECT ... FOR UPDATE`" hold §9 describes.
enum LockGuard {
    Local(OwnedMutexGuard<()>),
    // Session-level advisory locks are tied to the connection that took
    // them, not the pool, so the lock must pin one connection out of the
    // pool for the handle's lifetime rather than borrow one per query.
    #[cfg(feature = "session-sql")]
    Sql(Option<sqlx::pool::PoolConnection<sqlx::Postgres>>),
}

#[cfg(feature = "session-sql")]
impl Drop for LockGuard {
    fn drop(&mut self) {
        if let LockGuard::Sql(conn) = self {
            if let Some(mut conn) = conn.take() {
                tokio::spawn(async move {
                    let _ = sqlx::query("SELECT pg_advisory_unlock_all()").execute(&mut *conn).await;
                });
            }
        }
    }
}

impl LockHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// The session store contract (§3, §5). Implementations must guarantee a
/// single writer per session at a time; callers acquire `lock`, perform
/// `get`/`put`, then `unlock`. `put` is all-or-nothing for the whole state
/// blob (§5 "Atomicity guarantee").
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<SessionState>, StoreError>;
    async fn put(&self, id: &str, state: SessionState, ttl: Option<Duration>) -> Result<(), StoreError>;
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
    /// Acquire the per-session lock with a maximum hold time (§5 "a maximum
    /// hold time"); a lock already held by an in-flight turn resolves to
    /// [`StoreError::SessionBusy`] rather than blocking indefinitely (§6
    /// "attempting to start a second turn... returns `session_busy`").
    async fn lock(&self, id: &str, max_hold: Duration) -> Result<LockHandle, StoreError>;
    fn unlock(&self, _handle: LockHandle) {}
    /// Drop every session whose TTL has elapsed; returns the number
    /// removed. Called by the background sweeper (§6 `SESSION_TTL`).
    async fn sweep_expired(&self) -> usize;
}

struct Entry {
    state: SessionState,
    expires_at: Option<chrono::DateTime<Utc>>,
}

/// Default backend (§6 `SESSION_STORE_BACKEND=memory`): a process-local
/// map guarded by per-session async mutexes. No persistence across
/// restarts — adequate for a single-process deployment or local/dev runs.
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()), locks: Mutex::new(HashMap::new()) }
    }

    fn lock_for(&self, id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(id.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn get(&self, id: &str) -> Result<Option<SessionState>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(id).map(|e| e.state.clone()))
    }

    async fn put(&self, id: &str, state: SessionState, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = ttl.and_then(|d| chrono::Duration::from_std(d).ok()).map(|d| Utc::now() + d);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(id.to_string(), Entry { state, expires_at });
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(id);
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.remove(id);
        Ok(())
    }

    async fn lock(&self, id: &str, max_hold: Duration) -> Result<LockHandle, StoreError> {
        let mutex = self.lock_for(id);
        let guard = tokio::time::timeout(max_hold, mutex.lock_owned())
            .await
            .map_err(|_| StoreError::SessionBusy)?;
        Ok(LockHandle { session_id: id.to_string(), _guard: LockGuard::Local(guard) })
    }

    async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, e| e.expires_at.map(|exp| exp > now).unwrap_or(true));
        before - entries.len()
    }
}

/// Fresh session-id generator (UUIDv4), used by the HTTP layer when a
/// caller starts a turn without supplying one (§6 `POST /event/start`).
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Sled-backed persistent store, used when a single process should survive
/// restarts without standing up Redis/SQL. Grounded directly on the
/// teacher's `AnalysisStorage::open`/`store`/`get_by_timestamp` trio
/// (`sled::open`, `insert`, `get`, `flush`), generalised from a
/// timestamp-keyed append log to a session-id-keyed read-modify-write
/// store serialised as JSON, with the same mutex-guarded locking model as
/// [`InMemoryStore`] layered on top (sled itself has no notion of a
/// session-scoped lock).
pub struct SledStore {
    db: sled::Db,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SledStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { db, locks: Mutex::new(HashMap::new()) })
    }

    fn lock_for(&self, id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(id.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct StoredSession {
    state: SessionState,
    expires_at: Option<chrono::DateTime<Utc>>,
}

#[async_trait]
impl SessionStore for SledStore {
    async fn get(&self, id: &str) -> Result<Option<SessionState>, StoreError> {
        let raw = self.db.get(id).map_err(|e| StoreError::Backend(e.to_string()))?;
        match raw {
            None => Ok(None),
            Some(bytes) => {
                let stored: StoredSession =
                    serde_json::from_slice(&bytes).map_err(|e| StoreError::Backend(e.to_string()))?;
                if stored.expires_at.map(|exp| exp <= Utc::now()).unwrap_or(false) {
                    let _ = self.db.remove(id);
                    return Ok(None);
                }
                Ok(Some(stored.state))
            }
        }
    }

    async fn put(&self, id: &str, state: SessionState, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = ttl.and_then(|d| chrono::Duration::from_std(d).ok()).map(|d| Utc::now() + d);
        let stored = StoredSession { state, expires_at };
        let bytes = serde_json::to_vec(&stored).map_err(|e| StoreError::Backend(e.to_string()))?;
        self.db.insert(id, bytes).map_err(|e| StoreError::Backend(e.to_string()))?;
        self.db.flush_async().await.map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.db.remove(id).map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.remove(id);
        Ok(())
    }

    async fn lock(&self, id: &str, max_hold: Duration) -> Result<LockHandle, StoreError> {
        let mutex = self.lock_for(id);
        let guard = tokio::time::timeout(max_hold, mutex.lock_owned())
            .await
            .map_err(|_| StoreError::SessionBusy)?;
        Ok(LockHandle { session_id: id.to_string(), _guard: LockGuard::Local(guard) })
    }

    async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0;
        let keys: Vec<sled::IVec> = self.db.iter().keys().filter_map(Result::ok).collect();
        for key in keys {
            if let Ok(Some(bytes)) = self.db.get(&key) {
                if let Ok(stored) = serde_json::from_slice::<StoredSession>(&bytes) {
                    if stored.expires_at.map(|exp| exp <= now).unwrap_or(false) {
                        let _ = self.db.remove(&key);
                        removed += 1;
                    }
                }
            }
        }
        if removed > 0 {
            let _ = self.db.flush_async().await;
        }
        removed
    }
}

/// Redis-backed store (`SESSION_STORE_BACKEND=redis`, §6). Uses `SET ...
/// NX PX ...` leases for the per-session lock, as §9 prescribes ("Redis
/// `SET NX PX` leases"); the client's own connection pooling/retry covers
/// transport concerns, this store only encodes the session contract on
/// top.
#[cfg(feature = "session-redis")]
pub struct RedisStore {
    client: redis::Client,
}

#[cfg(feature = "session-redis")]
impl RedisStore {
    pub fn new(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[cfg(feature = "session-redis")]
#[async_trait]
impl SessionStore for RedisStore {
    async fn get(&self, id: &str) -> Result<Option<SessionState>, StoreError> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        let raw: Option<String> =
            conn.get(format!("session:{id}")).await.map_err(|e| StoreError::Backend(e.to_string()))?;
        raw.map(|s| serde_json::from_str(&s).map_err(|e| StoreError::Backend(e.to_string()))).transpose()
    }

    async fn put(&self, id: &str, state: SessionState, ttl: Option<Duration>) -> Result<(), StoreError> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        let body = serde_json::to_string(&state).map_err(|e| StoreError::Backend(e.to_string()))?;
        let key = format!("session:{id}");
        match ttl {
            Some(d) => conn
                .set_ex::<_, _, ()>(&key, body, d.as_secs().max(1))
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?,
            None => conn.set::<_, _, ()>(&key, body).await.map_err(|e| StoreError::Backend(e.to_string()))?,
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(format!("session:{id}")).await.map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn lock(&self, id: &str, max_hold: Duration) -> Result<LockHandle, StoreError> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        let key = format!("lock:{id}");
        let token = Uuid::new_v4().to_string();
        let acquired: bool = redis::cmd("SET")
            .arg(&key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(max_hold.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if !acquired {
            return Err(StoreError::SessionBusy);
        }
        // The process-local guard is a placeholder; the Redis lease itself
        // is the cross-process exclusivity mechanism.
        let local = Arc::new(AsyncMutex::new(()));
        let guard = local.lock_owned().await;
        let _ = conn.expire::<_, ()>(&key, max_hold.as_secs().max(1) as i64).await;
        Ok(LockHandle { session_id: id.to_string(), _guard: LockGuard::Local(guard) })
    }

    async fn sweep_expired(&self) -> usize {
        // Redis TTLs expire keys natively; nothing to sweep.
        0
    }
}

/// SQL-backed store (`SESSION_STORE_BACKEND=sql`, §6), a Postgres table of
/// `(id TEXT PRIMARY KEY, state JSONB, expires_at TIMESTAMPTZ)`. The lock
/// uses `pg_advisory_lock`, a session-scoped cross-connection mutex keyed
/// by a hash of the session id — the async equivalent of holding a
/// `SELECT ... FOR UPDATE` row lock across the turn (§9) without pinning a
/// single connection out of the pool for the whole call.
#[cfg(feature = "session-sql")]
pub struct SqlStore {
    pool: sqlx::PgPool,
}

#[cfg(feature = "session-sql")]
impl SqlStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = sqlx::PgPool::connect(url).await.map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (\
                id TEXT PRIMARY KEY, \
                state JSONB NOT NULL, \
                expires_at TIMESTAMPTZ\
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { pool })
    }

    fn advisory_key(id: &str) -> i64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        id.hash(&mut hasher);
        hasher.finish() as i64
    }
}

#[cfg(feature = "session-sql")]
#[async_trait]
impl SessionStore for SqlStore {
    async fn get(&self, id: &str) -> Result<Option<SessionState>, StoreError> {
        let row: Option<(serde_json::Value, Option<chrono::DateTime<Utc>>)> =
            sqlx::query_as("SELECT state, expires_at FROM sessions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        match row {
            None => Ok(None),
            Some((_, Some(exp))) if exp <= Utc::now() => {
                let _ = sqlx::query("DELETE FROM sessions WHERE id = $1").bind(id).execute(&self.pool).await;
                Ok(None)
            }
            Some((state, _)) => {
                serde_json::from_value(state).map(Some).map_err(|e| StoreError::Backend(e.to_string()))
            }
        }
    }

    async fn put(&self, id: &str, state: SessionState, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = ttl.and_then(|d| chrono::Duration::from_std(d).ok()).map(|d| Utc::now() + d);
        let body = serde_json::to_value(&state).map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::query(
            "INSERT INTO sessions (id, state, expires_at) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET state = EXCLUDED.state, expires_at = EXCLUDED.expires_at",
        )
        .bind(id)
        .bind(body)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn lock(&self, id: &str, max_hold: Duration) -> Result<LockHandle, StoreError> {
        let key = Self::advisory_key(id);
        let mut conn = self.pool.acquire().await.map_err(|e| StoreError::Backend(e.to_string()))?;
        let acquired: bool = tokio::time::timeout(
            max_hold,
            sqlx::query_scalar("SELECT pg_try_advisory_lock($1)").bind(key).fetch_one(&mut *conn),
        )
        .await
        .map_err(|_| StoreError::SessionBusy)?
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        if !acquired {
            return Err(StoreError::SessionBusy);
        }
        Ok(LockHandle { session_id: id.to_string(), _guard: LockGuard::Sql(Some(conn)) })
    }

    async fn sweep_expired(&self) -> usize {
        sqlx::query("DELETE FROM sessions WHERE expires_at IS NOT NULL AND expires_at <= now()")
            .execute(&self.pool)
            .await
            .map(|r| r.rows_affected() as usize)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state(id: &str) -> SessionState {
        SessionState::new(id, "oil_spill")
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryStore::new();
        store.put("s1", sample_state("s1"), None).await.unwrap();
        let fetched = store.get("s1").await.unwrap().expect("present");
        assert_eq!(fetched.session_id, "s1");
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let store = InMemoryStore::new();
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_session() {
        let store = InMemoryStore::new();
        store.put("s1", sample_state("s1"), None).await.unwrap();
        store.delete("s1").await.unwrap();
        assert!(store.get("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_lock_attempt_is_busy() {
        let store = Arc::new(InMemoryStore::new());
        let _held = store.lock("s1", Duration::from_secs(5)).await.unwrap();
        let second = store.lock("s1", Duration::from_millis(20)).await;
        assert!(matches!(second, Err(StoreError::SessionBusy)));
    }

    #[tokio::test]
    async fn lock_releases_on_drop() {
        let store = InMemoryStore::new();
        {
            let _held = store.lock("s1", Duration::from_secs(5)).await.unwrap();
        }
        let reacquired = store.lock("s1", Duration::from_millis(50)).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn sweep_expired_drops_ttl_sessions() {
        let store = InMemoryStore::new();
        store.put("expired", sample_state("expired"), Some(Duration::from_millis(1))).await.unwrap();
        store.put("fresh", sample_state("fresh"), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let removed = store.sweep_expired().await;
        assert_eq!(removed, 1);
        assert!(store.get("expired").await.unwrap().is_none());
        assert!(store.get("fresh").await.unwrap().is_some());
    }

    #[test]
    fn sled_store_persists_across_reopen() {
        let temp = tempfile::tempdir().unwrap();
        {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let store = SledStore::open(temp.path()).unwrap();
            rt.block_on(store.put("s1", sample_state("s1"), None)).unwrap();
        }
        let rt = tokio::runtime::Runtime::new().unwrap();
        let reopened = SledStore::open(temp.path()).unwrap();
        let fetched = rt.block_on(reopened.get("s1")).unwrap();
        assert!(fetched.is_some());
    }
}
