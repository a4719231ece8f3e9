//! speedwatch -- continuous network throughput and latency monitor.
//!
//! This crate provides the measurement engine, the test orchestrator that
//! repeats it on a cadence, the capped reading history, and statistics over
//! that history.

pub mod analysis;
pub mod api;
pub mod config;
pub mod history;
pub mod probes;
pub mod reading;
pub mod scheduler;
pub mod storage;
pub mod throughput;

use anyhow::Result;

use crate::config::{AppConfig, LoggingConfig};

/// Install the global tracing subscriber. `RUST_LOG` overrides the
/// configured level. Logs go to stderr so command output stays parseable.
pub fn init_tracing(cfg: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cfg.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Start the speedwatch daemon: API server plus orchestrator. With
/// `autostart`, continuous testing begins immediately.
pub async fn serve(config: &AppConfig, autostart: bool) -> Result<()> {
    // 1. Orchestrator (loads persisted history)
    tracing::info!(db_path = %config.storage.db_path.display(), "Initializing history database");
    let orchestrator = scheduler::Orchestrator::from_config(config)?;

    // 2. Continuous testing
    if autostart {
        orchestrator.start_testing().await;
    }

    // 3. API server
    let addr: std::net::SocketAddr = config.api.bind.parse()?;
    let app = api::router(api::state::AppState::new(orchestrator.clone()));

    tracing::info!(%addr, "speedwatch listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    orchestrator.shutdown().await;
    tracing::info!("speedwatch stopped");
    Ok(())
}
