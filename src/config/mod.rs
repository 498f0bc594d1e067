//! Process-wide engine configuration (§6 env var list), loaded once at
//! startup from environment variables with compiled-in defaults.
//!
//! Shaped after a `config::init()`/`config::get()` `OnceLock` pattern
//! (`WellConfig::load()`), generalised from a large TOML threshold table
//! to a small set of operational env-var tunables — this engine's config
//! surface is timeouts, pool sizes, and a recursion bound rather than a
//! domain threshold table.

use std::sync::OnceLock;
use std::time::Duration;

/// `SESSION_STORE_BACKEND` values (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStoreBackend {
    Memory,
    Redis,
    Sql,
}

impl SessionStoreBackend {
    fn from_env(value: &str) -> Self {
        match value {
            "redis" => Self::Redis,
            "sql" => Self::Sql,
            _ => Self::Memory,
        }
    }
}

/// `LOG_FORMAT` values (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Process-wide, operator-tunable engine configuration (§5, §6).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-turn node execution bound before the graph aborts (§4.10).
    pub recursion_limit: u32,
    /// Phase-1/phase-2 enrichment fan-out bound (§5).
    pub max_enrichment_workers: usize,
    /// Wall-clock timeout per enrichment future (§5).
    pub enrichment_timeout: Duration,
    /// Stage-2 normalisation LLM call timeout (§4.1 step 3).
    pub normalisation_timeout: Duration,
    /// Exponential backoff base for transient LLM/tool errors (§5).
    pub llm_backoff_base: Duration,
    /// Exponential backoff cap (§5).
    pub llm_backoff_max: Duration,
    /// Max attempts before falling back to `fallback_model` (§5).
    pub llm_max_attempts: u32,
    pub llm_provider: String,
    pub llm_model: String,
    pub llm_fallback_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub session_store_backend: SessionStoreBackend,
    pub log_format: LogFormat,
    /// Default session TTL for the background sweeper (§5, E.3 supplement).
    pub session_ttl: Duration,
    /// Directory containing `scenarios/<id>/...` descriptors (§6).
    pub scenarios_dir: std::path::PathBuf,
    /// Directory holding on-disk session-store/sled data.
    pub data_dir: std::path::PathBuf,
    /// Rate-limit threshold (requests per minute per key); `None` disables.
    pub rate_limit_per_minute: Option<u32>,
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// compiled-in defaults for anything unset (§6).
    pub fn load() -> Self {
        Self {
            recursion_limit: env_u32("RECURSION_LIMIT", 50),
            max_enrichment_workers: env_u32("MAX_ENRICHMENT_WORKERS", 3) as usize,
            enrichment_timeout: Duration::from_secs(env_u64("ENRICHMENT_TIMEOUT", 10)),
            normalisation_timeout: Duration::from_secs(env_u64("NORMALISATION_TIMEOUT", 5)),
            llm_backoff_base: Duration::from_secs(2),
            llm_backoff_max: Duration::from_secs(10),
            llm_max_attempts: 3,
            llm_provider: std::env::var("LLM_PROVIDER").unwrap_or_else(|_| "template".to_string()),
            llm_model: std::env::var("LLM_MODEL").unwrap_or_else(|_| "default".to_string()),
            llm_fallback_model: std::env::var("LLM_FALLBACK_MODEL").ok(),
            llm_api_key: std::env::var("LLM_API_KEY").ok(),
            llm_base_url: std::env::var("LLM_BASE_URL").ok(),
            session_store_backend: std::env::var("SESSION_STORE_BACKEND")
                .map(|v| SessionStoreBackend::from_env(&v))
                .unwrap_or(SessionStoreBackend::Memory),
            log_format: match std::env::var("LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            session_ttl: Duration::from_secs(env_u64("SESSION_TTL_SECS", 3600)),
            scenarios_dir: std::env::var("SCENARIOS_DIR")
                .unwrap_or_else(|_| "scenarios".to_string())
                .into(),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()).into(),
            rate_limit_per_minute: std::env::var("RATE_LIMIT_PER_MINUTE")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

static ENGINE_CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Initialize the global engine configuration. Must be called exactly once
/// before any call to `get()`.
pub fn init(config: EngineConfig) {
    if ENGINE_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get a reference to the global engine configuration.
///
/// Panics if `init()` has not been called — a missing config is a fatal
/// startup error, not a recoverable condition.
pub fn get() -> &'static EngineConfig {
    ENGINE_CONFIG
        .get()
        .expect("config::get() called before config::init() — this is a startup bug")
}

pub fn is_initialized() -> bool {
    ENGINE_CONFIG.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        std::env::remove_var("RECURSION_LIMIT");
        std::env::remove_var("MAX_ENRICHMENT_WORKERS");
        std::env::remove_var("ENRICHMENT_TIMEOUT");
        let config = EngineConfig::load();
        assert_eq!(config.recursion_limit, 50);
        assert_eq!(config.max_enrichment_workers, 3);
        assert_eq!(config.enrichment_timeout, Duration::from_secs(10));
    }
}
