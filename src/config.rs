//! Configuration management for the dispatcher
//!
//! Loads configuration from TOML files with environment variable substitution.
//! Every section falls back to built-in defaults, so running without a config
//! file is valid. Command line flags override whatever is loaded here.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

const CONFIG_ENV: &str = "TXDISPATCH_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rpc: RpcConfig,
    pub wallet: WalletConfig,
    pub gas: GasConfig,
    pub confirmation: ConfirmationConfig,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub url: String,
    pub request_timeout_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8545".to_string(),
            request_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub keystore_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    /// Buffer percentage added to the estimated gas limit
    pub limit_buffer_percent: u64,
    /// Buffer percentage added to the suggested gas price
    pub price_buffer_percent: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub poll_interval_ms: u64,
    pub wait_timeout_secs: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            wait_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Worksheet read from `.xlsx` batch files
    pub sheet: String,
    /// Spreadsheet column receiving transaction hashes
    pub output_column: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            sheet: "Sheet1".to_string(),
            output_column: "F".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from an explicit path, `TXDISPATCH_CONFIG`, or the
    /// default location. Falls back to defaults when no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => env::var(CONFIG_ENV)
                .map(PathBuf::from)
                .ok()
                .or_else(|| {
                    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                    default.exists().then_some(default)
                }),
        };

        let settings = match config_path {
            Some(config_path) => {
                let config_str = std::fs::read_to_string(&config_path)
                    .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
                Self::from_toml(&config_str)?
            }
            None => Settings::default(),
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from TOML text, substituting `${VAR}` references first
    pub fn from_toml(input: &str) -> Result<Self> {
        let config_str = substitute_env_vars(input);
        toml::from_str(&config_str).with_context(|| "Failed to parse configuration")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.rpc.request_timeout_secs == 0 {
            anyhow::bail!("rpc.request_timeout_secs must be greater than zero");
        }
        if self.confirmation.poll_interval_ms == 0 {
            anyhow::bail!("confirmation.poll_interval_ms must be greater than zero");
        }
        if self.confirmation.wait_timeout_secs == 0 {
            anyhow::bail!("confirmation.wait_timeout_secs must be greater than zero");
        }
        let column = &self.batch.output_column;
        if column.is_empty() || !column.chars().all(|c| c.is_ascii_alphabetic()) {
            anyhow::bail!("batch.output_column must be a column letter, got {:?}", column);
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation.poll_interval_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation.wait_timeout_secs)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR
        .replace_all(input, |caps: &regex::Captures| {
            env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}
