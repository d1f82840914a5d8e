mod handlers;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use arbiter_common::config::ServiceConfig;
use arbiter_common::problems::InMemoryProblemStore;
use arbiter_judge::{EngineConfig, Judge, ProcessEngine};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub type AppJudge = Judge<ProcessEngine, InMemoryProblemStore>;

pub struct AppState {
    pub judge: AppJudge,
    /// Bounds simultaneous evaluations when `ARBITER_MAX_CONCURRENT_RUNS` is set.
    pub limiter: Option<Arc<Semaphore>>,
}

impl AppState {
    pub fn new(judge: AppJudge, max_concurrent_runs: Option<usize>) -> Self {
        Self {
            judge,
            limiter: max_concurrent_runs.map(|n| Arc::new(Semaphore::new(n))),
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Arbiter API booting...");

    let service = ServiceConfig::from_env()?;
    let engine_config = EngineConfig::load_or_default(&service.engine_config)?;
    info!(
        interpreter = %engine_config.interpreter.command,
        timeout_ms = engine_config.timeout_ms,
        "Engine configured"
    );

    let store = InMemoryProblemStore::load_dir(&service.problems_dir)?;

    match service.max_concurrent_runs {
        Some(limit) => info!(limit, "Concurrent evaluations bounded"),
        None => info!("Concurrent evaluations unbounded"),
    }

    let engine = ProcessEngine::new(engine_config);
    match engine.check_isolation().await {
        Ok(isolation) => info!(
            network = isolation.network,
            filesystem = isolation.filesystem,
            "Sandbox isolation checked"
        ),
        Err(e) => warn!(error = %format!("{:#}", e), "Sandbox isolation check failed"),
    }

    let judge = Judge::new(engine, store);
    let state = Arc::new(AppState::new(judge, service.max_concurrent_runs));

    let app = routes::app(state);

    let listener = TcpListener::bind(&service.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", service.bind_addr))?;

    info!("HTTP server listening on {}", service.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("API shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    warn!("Received shutdown signal, finishing in-flight evaluations...");
}
