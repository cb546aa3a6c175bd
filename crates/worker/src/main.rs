use anyhow::{Context, Result};
use cadence_worker::config::DEFAULT_LOG_FILTER;
use cadence_worker::{CadenceWorker, WorkerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before reading any configuration
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Ok(path) = dotenv {
        tracing::info!("Loaded .env from {:?}", path);
    }

    tracing::info!("cadence-worker starting...");

    let config = WorkerConfig::from_env();
    tracing::info!(
        worker_id = %config.worker_id,
        data_dir = ?config.data_dir,
        shutdown_timeout = ?config.shutdown_timeout,
        "Worker configured"
    );

    let worker = CadenceWorker::new(config).context("Failed to create cadence worker")?;

    tokio::select! {
        result = worker.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker error");
                worker.shutdown().await;
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    worker.shutdown().await;
    tracing::info!("Worker shutdown complete");
    Ok(())
}
