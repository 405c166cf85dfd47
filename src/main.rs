//! inference-router - multi-provider AI inference routing service
//!
//! Loads configuration, seeds the provider registry, and serves the JSON
//! control surface.

use inference_router::core::{
    EnvCredentialStore, InMemoryStateStore, SystemClock, TracingTelemetry,
};
use inference_router::{server, Router, RouterConfig};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ROUTER_CONFIG").ok())
        .unwrap_or_else(|| "config/router.yaml".to_string());

    let config = RouterConfig::load(&config_path).await?;
    let router = Arc::new(
        Router::init(
            &config,
            Arc::new(EnvCredentialStore),
            Arc::new(InMemoryStateStore::new(config.providers.clone())),
            Arc::new(TracingTelemetry),
            Arc::new(SystemClock::new()),
        )
        .await?,
    );

    server::run(&config.server, router.clone()).await?;

    router.shutdown().await;
    Ok(())
}
