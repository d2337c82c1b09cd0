//! # Bloomstead
//!
//! Headless entry point: loads the engine config, plays a scripted farm
//! day and round-trips it through the configured save provider.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

use anyhow::Result;
use bloomstead_engine::{app, EngineConfig};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Main entry point.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("bloomstead=info".parse()?))
        .init();

    info!("Bloomstead starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = EngineConfig::load();
    let summary = app::run(&config).await?;
    info!(
        day = summary.day,
        harvested = summary.harvested,
        saved = summary.provider.is_some(),
        reloaded = summary.reload_matches,
        "Run complete"
    );

    info!("Bloomstead shutdown complete");
    Ok(())
}
