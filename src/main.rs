//! Host process for the transcript store.
//!
//! Loads configuration, opens the configured backend and waits for ctrl-c.

use std::process::ExitCode;

use transcript_store::application::open_store;
use transcript_store::config::AppConfig;
use transcript_store::telemetry::init_tracing;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.logging);

    let store = match open_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "Transcript store failed to start");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(backend = ?config.store.backend, "Transcript store ready");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return ExitCode::FAILURE;
    }

    drop(store);
    tracing::info!("Transcript store stopped");
    ExitCode::SUCCESS
}
