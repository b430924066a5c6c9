//! Configuration loader and validator for the queue daemon.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
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
    pub app: App,
    #[serde(default)]
    pub workers: Workers,
    pub marketplaces: Marketplaces,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Polling cadence and request limits shared by all workers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Workers {
    pub ingest_interval_secs: u64,
    pub reconcile_interval_secs: u64,
    pub request_timeout_secs: u64,
    /// Container order lists fetched in parallel per reconcile cycle.
    pub container_fetch_concurrency: usize,
}

impl Default for Workers {
    fn default() -> Self {
        Self {
            ingest_interval_secs: 10,
            reconcile_interval_secs: 5,
            request_timeout_secs: 30,
            container_fetch_concurrency: 4,
        }
    }
}

impl Workers {
    pub fn ingest_interval(&self) -> Duration {
        Duration::from_secs(self.ingest_interval_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Credentials per marketplace. A missing section disables that marketplace.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Marketplaces {
    #[serde(default)]
    pub wb: Option<Wb>,
    #[serde(default)]
    pub ozon: Option<Ozon>,
    #[serde(default)]
    pub yandex: Option<Yandex>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wb {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ozon {
    pub client_id: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Yandex {
    pub token: String,
    pub campaign_id: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// `DATABASE_URL` if set, else a SQLite file inside `app.data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/factory-queue.db", self.app.data_dir))
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

fn blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if blank(&cfg.app.data_dir) {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    let w = &cfg.workers;
    if w.ingest_interval_secs == 0 {
        return Err(ConfigError::Invalid("workers.ingest_interval_secs must be > 0"));
    }
    if w.reconcile_interval_secs == 0 {
        return Err(ConfigError::Invalid("workers.reconcile_interval_secs must be > 0"));
    }
    if w.request_timeout_secs == 0 {
        return Err(ConfigError::Invalid("workers.request_timeout_secs must be > 0"));
    }
    if w.container_fetch_concurrency == 0 {
        return Err(ConfigError::Invalid("workers.container_fetch_concurrency must be > 0"));
    }

    let mp = &cfg.marketplaces;
    if mp.wb.is_none() && mp.ozon.is_none() && mp.yandex.is_none() {
        return Err(ConfigError::Invalid("at least one marketplace must be configured"));
    }
    if let Some(wb) = &mp.wb {
        if blank(&wb.token) {
            return Err(ConfigError::Invalid("marketplaces.wb.token must be non-empty"));
        }
    }
    if let Some(ozon) = &mp.ozon {
        if blank(&ozon.client_id) {
            return Err(ConfigError::Invalid("marketplaces.ozon.client_id must be non-empty"));
        }
        if blank(&ozon.api_key) {
            return Err(ConfigError::Invalid("marketplaces.ozon.api_key must be non-empty"));
        }
    }
    if let Some(yandex) = &mp.yandex {
        if blank(&yandex.token) {
            return Err(ConfigError::Invalid("marketplaces.yandex.token must be non-empty"));
        }
        if blank(&yandex.campaign_id) {
            return Err(ConfigError::Invalid("marketplaces.yandex.campaign_id must be non-empty"));
        }
    }

    Ok(())
}

/// Example configuration with every marketplace enabled.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

workers:
  ingest_interval_secs: 10
  reconcile_interval_secs: 5
  request_timeout_secs: 30
  container_fetch_concurrency: 4

marketplaces:
  wb:
    token: "YOUR_WB_API_TOKEN"
  ozon:
    client_id: "123456"
    api_key: "YOUR_OZON_API_KEY"
  yandex:
    token: "YOUR_YANDEX_OAUTH_TOKEN"
    campaign_id: "21000000"
"#
}
