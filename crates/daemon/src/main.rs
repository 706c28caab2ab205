//! Scrapeflow Daemon - Main Entry Point

mod app;
mod config;
mod extract;
mod logging;
mod telemetry;

use anyhow::Result;
use tracing::info;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = logging::init()?;
    info!("Scrapeflow daemon v{} starting...", VERSION);

    let config = config::DaemonConfig::load()?;
    let result = app::run(config).await;

    telemetry::shutdown();
    result
}
