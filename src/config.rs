//! Configuration loader and validator for the listing watcher.
//!
//! The file is YAML. A legacy `{"urls": [...]}` JSON file is valid YAML and
//! loads with every other setting at its default.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub app: App,
    #[serde(default)]
    pub render: RenderSettings,
    /// Listing search pages to watch, in processing order.
    pub urls: Vec<String>,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct App {
    pub snapshot_path: PathBuf,
    pub interval_secs: u64,
    pub concurrency: usize,
    pub strict_snapshot: bool,
}

impl Default for App {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("./config/analysis_results.csv"),
            interval_secs: 60,
            concurrency: 2,
            strict_snapshot: false,
        }
    }
}

impl App {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RenderBackend {
    Chrome,
    Http,
}

/// Rendering backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RenderSettings {
    pub backend: RenderBackend,
    pub chrome_path: String,
    pub settle_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            backend: RenderBackend::Chrome,
            chrome_path: "chromium".into(),
            settle_delay_ms: 3000,
            timeout_secs: 30,
        }
    }
}

impl RenderSettings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Ensure the snapshot file's parent directory exists.
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        match self.app.snapshot_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
            _ => Ok(()),
        }
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.urls.is_empty() {
        return Err(ConfigError::Invalid("urls must list at least one source"));
    }
    if cfg.urls.iter().any(|u| u.trim().is_empty()) {
        return Err(ConfigError::Invalid("urls must not contain blank entries"));
    }

    if cfg.app.snapshot_path.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("app.snapshot_path must be non-empty"));
    }
    if cfg.app.interval_secs == 0 {
        return Err(ConfigError::Invalid("app.interval_secs must be > 0"));
    }
    if cfg.app.concurrency == 0 {
        return Err(ConfigError::Invalid("app.concurrency must be > 0"));
    }

    if cfg.render.backend == RenderBackend::Chrome && cfg.render.chrome_path.trim().is_empty() {
        return Err(ConfigError::Invalid("render.chrome_path must be non-empty"));
    }
    if cfg.render.timeout_secs == 0 {
        return Err(ConfigError::Invalid("render.timeout_secs must be > 0"));
    }
    if cfg.render.settle_delay() >= cfg.render.timeout() {
        return Err(ConfigError::Invalid(
            "render.settle_delay_ms must be shorter than render.timeout_secs",
        ));
    }

    Ok(())
}

/// Returns an example YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  snapshot_path: "./config/analysis_results.csv"
  interval_secs: 60
  concurrency: 2
  strict_snapshot: false

render:
  backend: chrome
  chrome_path: "chromium"
  settle_delay_ms: 3000
  timeout_secs: 30

urls:
  - "https://es.wallapop.com/app/search?keywords=bicicleta&max_sale_price=400"
  - "https://es.wallapop.com/app/search?keywords=casco%20moto"
"#
}
