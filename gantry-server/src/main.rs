//! Gantry Server
//!
//! A minimal CI pipeline execution engine. Clients submit a
//! repository/branch/commit triple, a bounded pool of workers runs the
//! repository's CI steps inside container sandboxes, and clients poll
//! status and logs.
//!
//! Architecture:
//! - Configuration: environment-derived settings
//! - Store: pipeline persistence behind a capability trait (Postgres)
//! - Sandbox: container runtime behind a capability trait (CLI-driven)
//! - Scheduler: polling loop dispatching workers under a concurrency cap
//! - API: axum HTTP surface for submission and polling
//!
//! One process owns all of it; the scheduler and the HTTP server share
//! the store and run side by side.

mod api;
mod config;
mod db;
mod sandbox;
mod scheduler;
mod store;
mod worker;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::sandbox::{CliRuntime, SandboxRuntime};
use crate::scheduler::Poller;
use crate::store::{PgStore, PipelineStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gantry_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Gantry Server");

    let config = load_config()?;
    info!(
        "Loaded configuration: bind_addr={}, poll_interval={:?}, max_workers={}",
        config.bind_addr, config.poll_interval, config.max_workers
    );

    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;
    info!("Database connection pool created");

    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let store: Arc<dyn PipelineStore> = Arc::new(PgStore::new(pool));

    let runtime = CliRuntime::new(config.runtime_binary.clone());
    if let Err(e) = runtime.check_available().await {
        // Workers will abort their pipelines until the runtime comes up;
        // the HTTP surface still accepts submissions.
        warn!("container runtime check failed: {e:#}");
    }
    let runtime: Arc<dyn SandboxRuntime> = Arc::new(runtime);

    let poller = Poller::new(config.clone(), store.clone(), runtime);
    tokio::spawn(async move {
        if let Err(e) = poller.run().await {
            error!("scheduler stopped: {e:#}");
        }
    });
    info!("Scheduler started");

    let app = api::create_router(store);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shut down");
    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(_) => {
            info!("Failed to load config from environment, using defaults");
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Resolves on ctrl-c or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
