//! apron-marshal — incident-response orchestration engine for airport
//! apron emergencies (oil spill, bird strike, FOD).
//!
//! # Usage
//!
//! ```bash
//! # Run with in-memory session storage and the template (no-inference) LLM backend
//! cargo run --release
//!
//! # Run against a persistent sled data directory
//! DATA_DIR=/var/lib/apron-marshal cargo run --release
//! ```
//!
//! # Environment Variables
//!
//! See [`apron_marshal::config::EngineConfig`] for the full list —
//! `SCENARIOS_DIR`, `DATA_DIR`, `SESSION_STORE_BACKEND`, `RECURSION_LIMIT`,
//! `LLM_PROVIDER`, `RUST_LOG`, and friends.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use apron_marshal::api::middleware::RateLimiter;
use apron_marshal::api::{create_app, AppState};
use apron_marshal::background::{LlmAvailabilityCheck, SelfHealer, SessionTtlCheck};
use apron_marshal::config::{self, EngineConfig, LogFormat, SessionStoreBackend};
use apron_marshal::llm::{LlmClient, TemplateBackend};
use apron_marshal::scenario::ScenarioRegistry;
use apron_marshal::storage::{InMemoryStore, ProcessLock, SessionStore};
use apron_marshal::tools::context::{CleanupTimeTable, DelayTable, NullProviders, ToolContext};
use apron_marshal::tools::ToolRegistry;
use apron_marshal::topology::{PropagationTable, Topology};
use apron_marshal::types::TopologyFile;

#[derive(Parser, Debug)]
#[command(name = "apron-marshal")]
#[command(about = "Apron incident-response orchestration engine")]
#[command(version)]
struct CliArgs {
    /// Override the server bind address (default: "0.0.0.0:8080" or `$BIND_ADDR`).
    #[arg(short, long)]
    addr: Option<String>,

    /// Override the scenario descriptor directory (default: `$SCENARIOS_DIR` or "scenarios").
    #[arg(long)]
    scenarios_dir: Option<String>,

    /// Override the data directory used for the sled store and operational tables.
    #[arg(long)]
    data_dir: Option<String>,
}

enum TaskName {
    HttpServer,
    SelfHealer,
}

fn read_yaml_or_default<T>(path: &std::path::Path) -> T
where
    T: for<'de> serde::Deserialize<'de> + Default,
{
    match std::fs::read_to_string(path) {
        Ok(text) => match serde_yaml::from_str(&text) {
            Ok(value) => value,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to parse operational data file, using defaults");
                T::default()
            }
        },
        Err(_) => {
            info!(path = %path.display(), "operational data file not found, using defaults");
            T::default()
        }
    }
}

fn load_topology(data_dir: &std::path::Path) -> Topology {
    let file: TopologyFile = read_yaml_or_default(&data_dir.join("topology.yaml"));
    if file.nodes.is_empty() {
        warn!("topology has no nodes — impact-zone propagation will return empty zones");
    }
    Topology::from_file(file).unwrap_or_else(|err| {
        error!(%err, "invalid topology file, falling back to an empty graph");
        Topology::from_file(TopologyFile::default()).expect("empty topology never fails to build")
    })
}

async fn build_llm_client(config: &EngineConfig) -> Arc<dyn LlmClient> {
    #[cfg(feature = "llm")]
    if config.llm_provider == "mistralrs" {
        match apron_marshal::llm::MistralRsBackend::load(&config.llm_model).await {
            Ok(backend) => return Arc::new(backend),
            Err(err) => {
                error!(%err, "failed to load mistralrs backend, falling back to template backend");
            }
        }
    }
    let _ = config;
    Arc::new(TemplateBackend)
}

async fn build_session_store(config: &EngineConfig) -> Result<Arc<dyn SessionStore>> {
    match config.session_store_backend {
        SessionStoreBackend::Memory => Ok(Arc::new(InMemoryStore::new())),
        SessionStoreBackend::Redis => {
            #[cfg(feature = "session-redis")]
            {
                let _ = config;
                let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
                let store = apron_marshal::storage::RedisStore::new(&url).context("connecting to redis")?;
                Ok(Arc::new(store))
            }
            #[cfg(not(feature = "session-redis"))]
            {
                let _ = config;
                anyhow::bail!("SESSION_STORE_BACKEND=redis requires the `session-redis` feature");
            }
        }
        SessionStoreBackend::Sql => {
            #[cfg(feature = "session-sql")]
            {
                let _ = config;
                let url = std::env::var("DATABASE_URL").context("SESSION_STORE_BACKEND=sql requires DATABASE_URL")?;
                let store = apron_marshal::storage::SqlStore::connect(&url).await.context("connecting to postgres")?;
                Ok(Arc::new(store))
            }
            #[cfg(not(feature = "session-sql"))]
            {
                let _ = config;
                anyhow::bail!("SESSION_STORE_BACKEND=sql requires the `session-sql` feature");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let config = EngineConfig::load();
    // `RUST_LOG` takes priority (tracing's own convention); `LOG_LEVEL` is
    // this engine's documented knob (§6) for operators who don't set the
    // former; "info" is the last-resort default.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).json().init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init(),
    }

    info!("apron-marshal incident-response engine starting");

    let scenarios_dir = args.scenarios_dir.unwrap_or_else(|| config.scenarios_dir.to_string_lossy().to_string());
    let data_dir = args.data_dir.map(std::path::PathBuf::from).unwrap_or_else(|| config.data_dir.clone());
    let server_addr: SocketAddr = args
        .addr
        .or_else(|| std::env::var("BIND_ADDR").ok())
        .unwrap_or_else(|| "0.0.0.0:8080".to_string())
        .parse()
        .context("invalid bind address")?;

    std::fs::create_dir_all(&data_dir).with_context(|| format!("creating data directory {:?}", data_dir))?;
    let _process_lock = ProcessLock::acquire(&data_dir).context("another instance is already running")?;

    config::init(config);
    let config = config::get();

    let scenarios = Arc::new(
        ScenarioRegistry::load(scenarios_dir.clone())
            .with_context(|| format!("loading scenarios from {scenarios_dir}"))?,
    );
    let topology = Arc::new(load_topology(&data_dir));
    let propagation_table = Arc::new(read_yaml_or_default::<PropagationTable>(&data_dir.join("propagation_table.yaml")));
    let cleanup_time_table = Arc::new(read_yaml_or_default::<CleanupTimeTable>(&data_dir.join("cleanup_time_table.yaml")));
    let delay_table = Arc::new(read_yaml_or_default::<DelayTable>(&data_dir.join("delay_table.yaml")));

    let llm = build_llm_client(config).await;
    let store = build_session_store(config).await?;
    let registry = Arc::new(ToolRegistry::with_default_tools());

    let ctx = Arc::new(ToolContext {
        topology,
        propagation_table,
        cleanup_time_table,
        delay_table,
        flight_data: Arc::new(NullProviders),
        weather: Arc::new(NullProviders),
        aircraft_info: Arc::new(NullProviders),
        scenario: scenarios.clone(),
        llm: llm.clone(),
    });

    let app_state = AppState {
        store: store.clone(),
        llm: llm.clone(),
        registry,
        scenarios,
        ctx,
        recursion_limit: config.recursion_limit,
        session_ttl: config.session_ttl,
        lock_hold: config.normalisation_timeout.max(std::time::Duration::from_secs(30)),
        api_key: std::env::var("API_KEY").ok(),
        rate_limit_per_minute: config.rate_limit_per_minute,
        limiter: Arc::new(RateLimiter::default()),
    };

    let app = create_app(app_state);
    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .with_context(|| format!("failed to bind to {server_addr}"))?;
    info!(%server_addr, "HTTP server listening");

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received Ctrl+C, initiating shutdown");
        shutdown_token.cancel();
    });

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    let http_cancel = cancel_token.clone();
    task_set.spawn(async move {
        let result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move {
                http_cancel.cancelled().await;
                info!("[HttpServer] received shutdown signal");
            })
            .await;
        match result {
            Ok(()) => {
                info!("[HttpServer] graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(err) => {
                error!("[HttpServer] server error: {err}");
                Err(anyhow::anyhow!("HTTP server error: {err}"))
            }
        }
    });

    let healer = SelfHealer::new(vec![
        Box::new(SessionTtlCheck::new(store.clone())),
        Box::new(LlmAvailabilityCheck::new(llm.clone())),
    ]);
    let healer_cancel = cancel_token.clone();
    task_set.spawn(async move {
        healer.run(healer_cancel).await;
        Ok(TaskName::SelfHealer)
    });

    while let Some(result) = task_set.join_next().await {
        match result {
            Ok(Ok(TaskName::HttpServer)) => info!("HTTP server task exited"),
            Ok(Ok(TaskName::SelfHealer)) => info!("self-healer task exited"),
            Ok(Err(err)) => {
                error!("task failed: {err}");
                cancel_token.cancel();
            }
            Err(join_err) => {
                error!("task panicked: {join_err}");
                cancel_token.cancel();
            }
        }
    }

    info!("apron-marshal shutdown complete");
    Ok(())
}
