mod supervisor;

use anyhow::Result;
use relay_core::Config;
use supervisor::Supervisor;
use tokio;
use tracing;
use tracing_subscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Chat Push Relay");

    // Load configuration and bring the pipeline up. Store-open failures are
    // fatal here; everything downstream reconnects on its own.
    let config = Config::from_env();
    let supervisor = Supervisor::init(config)?;
    supervisor.start();

    let api_state = supervisor.api_state();

    // Management API runs until a bind failure (fatal) or shutdown signal.
    tokio::select! {
        result = relay_api::run(api_state) => {
            if let Err(e) = result {
                tracing::error!("management API error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    supervisor.stop().await;

    Ok(())
}
