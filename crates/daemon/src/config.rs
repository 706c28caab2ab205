//! Daemon configuration
//!
//! Optional file named by `SCRAPEFLOW_CONFIG` (any format the `config` crate
//! understands), overlaid with `SCRAPEFLOW_*` environment variables. Nested
//! keys use `__`: `SCRAPEFLOW_RPC__PORT=9700`. Every field has a default.

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use scrapeflow_core::application::constants::{
    DEFAULT_MAX_CONCURRENCY, DEFAULT_SCHEDULER_TICK, DEFAULT_SESSION_MAX_AGE,
    DEFAULT_SHUTDOWN_GRACE,
};
use scrapeflow_core::application::{CaptchaConfig, LoginConfig};
use scrapeflow_core::port::CaptchaMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "SCRAPEFLOW_CONFIG";
const ENV_PREFIX: &str = "SCRAPEFLOW";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub database: DatabaseConfig,
    pub rpc: RpcConfig,
    pub queue: QueueConfig,
    pub scheduler: SchedulerConfig,
    pub progress: ProgressConfig,
    pub session: SessionConfig,
    pub logs: LogsConfig,
    pub browser: BrowserSettings,
    pub captcha: CaptchaSettings,
    /// Login protocol of the merchant portal
    pub merchant_portal: LoginConfig,
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.scrapeflow/scrapeflow.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            host: scrapeflow_api_rpc::server::DEFAULT_RPC_HOST.to_string(),
            port: scrapeflow_api_rpc::server::DEFAULT_RPC_PORT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_concurrency: usize,
    pub shutdown_grace_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub tick_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_secs: DEFAULT_SCHEDULER_TICK.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// `{base_url}/{executionId}/progress`; progress is not pushed when unset
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Fallback file store, used when the database store fails
    pub dir: Option<String>,
    pub max_age_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dir: Some("~/.scrapeflow/sessions".to_string()),
            max_age_secs: DEFAULT_SESSION_MAX_AGE.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    /// Per-execution log files of verbose jobs
    pub mirror_dir: Option<String>,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            mirror_dir: Some("~/.scrapeflow/logs".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub executable: Option<String>,
    pub navigation_timeout_secs: u64,
    pub extra_args: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            navigation_timeout_secs: 30,
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptchaSettings {
    pub mode: CaptchaMode,
    pub manual_timeout_secs: u64,
    pub automated_timeout_secs: u64,
    pub solver_url: String,
    pub api_key: Option<String>,
    pub detection: CaptchaConfig,
}

impl Default for CaptchaSettings {
    fn default() -> Self {
        Self {
            mode: CaptchaMode::Manual,
            manual_timeout_secs: 300,
            automated_timeout_secs: 180,
            solver_url: "https://2captcha.com".to_string(),
            api_key: None,
            detection: CaptchaConfig::default(),
        }
    }
}

/// Selectors of the generic extraction handlers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub title_selector: String,
    pub breadcrumb_selector: String,
    /// Output field name -> selector whose text becomes the value
    pub detail_fields: std::collections::BTreeMap<String, String>,
    pub listing_item_selector: String,
    pub listing_next_selector: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            title_selector: "h1".to_string(),
            breadcrumb_selector: "nav.breadcrumb a, .breadcrumb li".to_string(),
            detail_fields: Default::default(),
            listing_item_selector: "a.product-link".to_string(),
            listing_next_selector: "a[rel='next']".to_string(),
        }
    }
}

impl DaemonConfig {
    /// Load from `SCRAPEFLOW_CONFIG` (if set) and the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).ok();
        Self::load_from(path.as_deref())
    }

    pub fn load_from(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            let expanded = expand(path);
            if !std::path::Path::new(&expanded).exists() {
                bail!("config file not found: {}", expanded);
            }
            builder = builder.add_source(File::with_name(&expanded));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: DaemonConfig = builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue.max_concurrency < 1 {
            bail!("queue.max_concurrency must be at least 1");
        }
        if self.scheduler.tick_secs == 0 {
            bail!("scheduler.tick_secs must be positive");
        }
        if self.session.max_age_secs == 0 {
            bail!("session.max_age_secs must be positive");
        }
        if self.captcha.mode == CaptchaMode::Automated && self.captcha.api_key.is_none() {
            bail!("captcha.api_key is required in automated mode");
        }
        Ok(())
    }

    /// SQLite URL for the configured path; `:memory:` maps to an in-memory database
    pub fn database_url(&self) -> String {
        if self.database.path == ":memory:" {
            return "sqlite::memory:".to_string();
        }
        format!("sqlite://{}", expand(&self.database.path))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.queue.shutdown_grace_secs)
    }

    pub fn session_max_age(&self) -> Duration {
        Duration::from_secs(self.session.max_age_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.browser.navigation_timeout_secs)
    }

    pub fn session_dir(&self) -> Option<PathBuf> {
        self.session.dir.as_deref().map(|d| PathBuf::from(expand(d)))
    }

    pub fn log_mirror_dir(&self) -> Option<PathBuf> {
        self.logs.mirror_dir.as_deref().map(|d| PathBuf::from(expand(d)))
    }
}

/// `~` and `$VAR` expansion; unknown variables are left as written
pub fn expand(path: &str) -> String {
    shellexpand::full(path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| shellexpand::tilde(path).into_owned())
}
