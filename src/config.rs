use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    pub history: HistoryConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// JSON body cap in megabytes; sized for inline `data:` images.
    #[serde(default = "default_max_body_mb")]
    pub max_body_mb: usize,
}

fn default_max_body_mb() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Ceiling on write attempts for one logical save; version conflicts
    /// beyond this surface as a terminal failure.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:7410".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            poll_secs: default_poll_secs(),
        }
    }
}

fn default_poll_secs() -> u64 {
    30
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    if config.server.max_body_mb == 0 {
        anyhow::bail!("server.max_body_mb must be >= 1");
    }

    if config.api.base_url.trim().is_empty() {
        anyhow::bail!("api.base_url must not be empty");
    }

    if config.api.timeout_secs == 0 {
        anyhow::bail!("api.timeout_secs must be >= 1");
    }

    if config.api.max_attempts == 0 {
        anyhow::bail!("api.max_attempts must be >= 1");
    }

    if config.alerts.poll_secs == 0 {
        anyhow::bail!("alerts.poll_secs must be >= 1");
    }

    Ok(config)
}
