//! Process diagnostics
//!
//! - `RUST_LOG` filter, default `scrapeflow=info`
//! - `SCRAPEFLOW_LOG_FORMAT=json` for JSON lines, pretty otherwise
//! - `SCRAPEFLOW_LOG_DIR` adds a daily rolling JSON file

use crate::config::expand;
use crate::telemetry::{self, BoxedLayer};
use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "scrapeflow=info";
const LOG_FORMAT_ENV: &str = "SCRAPEFLOW_LOG_FORMAT";
const LOG_DIR_ENV: &str = "SCRAPEFLOW_LOG_DIR";
const LOG_FILE_PREFIX: &str = "scrapeflow.log";

/// Install the global subscriber. Keep the guard alive until exit so the
/// file writer flushes.
pub fn init() -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("invalid log filter")?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        layers.push(fmt::layer().json().boxed());
    } else {
        layers.push(fmt::layer().pretty().boxed());
    }

    let guard = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) => {
            let dir = expand(&dir);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("cannot create log directory {}", dir))?;
            let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            );
            Some(guard)
        }
        Err(_) => None,
    };

    if let Some(otel) = telemetry::layer()? {
        layers.push(otel);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("tracing subscriber already installed")?;
    Ok(guard)
}
