//! janusIAM projection worker
//!
//! Connects to the database, verifies the schema and runs one worker per
//! projection until SIGTERM/Ctrl-C.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use janus_iam::event_store::EventStore;
use janus_iam::projection::Supervisor;
use janus_iam::{db, Config};

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "janus_iam=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;

    tracing::info!("Starting janusIAM projection worker");
    tracing::info!("Connecting to database...");

    let pool = db::connect(&config).await?;

    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");

    let store = EventStore::new(pool.clone());
    let mut supervisor = Supervisor::new(pool.clone(), store)
        .with_batch_size(config.projection_batch_size)
        .with_poll_interval(config.projection_poll_interval);
    supervisor.start();

    wait_for_stop_signal().await;

    tracing::info!("Shutting down...");
    supervisor.stop().await;
    pool.close().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Resolves once the process is asked to stop (Ctrl-C, or SIGTERM on
/// unix). Workers finish their current batch before exit.
async fn wait_for_stop_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).expect("sigterm handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(signal = "interrupt", "stop requested");
            }
            _ = sigterm.recv() => {
                tracing::info!(signal = "terminate", "stop requested");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!(signal = "interrupt", "stop requested");
    }
}
