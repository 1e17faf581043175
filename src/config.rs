use crate::orchestrator::FetchPolicy;
use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FigureMarketsConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TwelveDataConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
}

/// Listed order is also the merge precedence order: Figure Markets is
/// primary, Twelve Data is the fallback.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub figure_markets: Option<FigureMarketsConfig>,
    pub twelve_data: Option<TwelveDataConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            figure_markets: Some(FigureMarketsConfig {
                base_url: "https://www.figuremarkets.com".to_string(),
            }),
            twelve_data: Some(TwelveDataConfig {
                base_url: "https://api.twelvedata.com".to_string(),
                api_key: String::new(),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_deadline_ms() -> u64 {
    4000
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    500
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            deadline_ms: default_deadline_ms(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl FetchConfig {
    pub fn policy(&self) -> FetchPolicy {
        FetchPolicy {
            deadline: Duration::from_millis(self.deadline_ms),
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_ms),
        }
    }
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_refresh_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub symbols: Vec<String>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("in", "codito", "pulseboard")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("in", "codito", "pulseboard")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        if config.symbols.is_empty() {
            bail!(
                "Config file {} lists no symbols to track",
                path.as_ref().display()
            );
        }

        debug!("Successfully loaded config");
        Ok(config)
    }
}
