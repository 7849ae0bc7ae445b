use anyhow::Result;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;

mod api;
mod config;
mod db;
mod error;
mod ingest;
mod messaging;

pub use error::Error;

async fn run_app() -> Result<()> {
    // Initialize logging
    env_logger::init();
    info!("Starting Asset Tracking Ingestion Service");

    // Load configuration (optional path as first argument)
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = config::load_config(config_path.as_deref())?;
    info!("Configuration loaded");

    // Create database service (connects the shared pool, runs migrations)
    let database = db::DatabaseService::new(&config.database).await?;
    if !database.health_check().await? {
        warn!("Database health check failed at startup");
    }

    // Create and initialize message broker
    let message_broker = messaging::create_message_broker(config.message_broker.clone()).await?;
    info!("Message broker initialized");

    // Build the pipeline and put the consumer on its own task: scan
    // processing must not block on, or be blocked by, the API beyond
    // contention on the shared pool.
    let engine = ingest::PresenceEngine::new(database.pool.clone(), &config.pipeline);
    let ingest_service = ingest::IngestService::new(
        message_broker.clone() as Arc<dyn messaging::ScanBroker>,
        engine,
        &config.pipeline,
        &config.message_broker,
    )?;
    let ingest_handle = tokio::spawn(ingest_service.run());
    info!("Ingestion loop started");

    // Serve the read-only API until shutdown
    let http_server = api::rest::RestApi::new(&config.api, database.pool.clone())?;

    tokio::select! {
        result = http_server.run() => {
            error!("API server exited unexpectedly");
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }

    ingest_handle.abort();

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run_app().await {
        eprintln!("Application error: {:#}", e);
        std::process::exit(1);
    }
}
