//! CLI configuration file support.
//!
//! Precedence, highest first:
//! 1. CLI arguments
//! 2. Environment variables (`STRATA_STORE`, `STRATA_LOG_LEVEL`)
//! 3. Local config file (./.stratarc)
//! 4. Global config file (~/.strata/config.toml)
//! 5. Defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strata_training::{CompileOptions, TrainingConfig};
use thiserror::Error;

pub const STORE_ENV: &str = "STRATA_STORE";
pub const LOG_LEVEL_ENV: &str = "STRATA_LOG_LEVEL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrataConfig {
    /// Path of the JSON store file.
    #[serde(default)]
    pub store: Option<String>,

    #[serde(default)]
    pub log_level: Option<String>,

    /// Compile options used when `run` is not given them.
    #[serde(default)]
    pub defaults: DefaultOptions,

    #[serde(default)]
    pub training: Option<TrainingConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultOptions {
    pub batch_size: Option<u32>,
    pub epochs: Option<u32>,
    pub loss: Option<String>,
    pub metrics: Option<String>,
}

impl DefaultOptions {
    fn merge(&mut self, other: &Self) {
        if other.batch_size.is_some() {
            self.batch_size = other.batch_size;
        }
        if other.epochs.is_some() {
            self.epochs = other.epochs;
        }
        if let Some(ref loss) = other.loss {
            self.loss = Some(loss.clone());
        }
        if let Some(ref metrics) = other.metrics {
            self.metrics = Some(metrics.clone());
        }
    }

    /// Applies the configured values over the built-in defaults.
    pub fn to_options(&self) -> CompileOptions {
        let base = CompileOptions::default();
        CompileOptions {
            batch_size: self.batch_size.unwrap_or(base.batch_size),
            epochs: self.epochs.unwrap_or(base.epochs),
            loss: self.loss.clone().unwrap_or(base.loss),
            metrics: self.metrics.clone().unwrap_or(base.metrics),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),
}

impl StrataConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    pub fn default_global_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".strata")
            .join("config.toml")
    }

    pub fn default_local_path() -> PathBuf {
        PathBuf::from(".stratarc")
    }

    /// Loads the global then the local file. Missing files are skipped; a
    /// file that exists but does not parse is an error.
    pub fn discover_and_load() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for path in [Self::default_global_path(), Self::default_local_path()] {
            match Self::load_from_file(&path) {
                Ok(found) => config.merge(&found),
                Err(ConfigError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(config)
    }

    /// Values present in `other` win.
    pub fn merge(&mut self, other: &Self) {
        if let Some(ref store) = other.store {
            self.store = Some(store.clone());
        }
        if let Some(ref log_level) = other.log_level {
            self.log_level = Some(log_level.clone());
        }
        self.defaults.merge(&other.defaults);
        if let Some(ref training) = other.training {
            self.training = Some(training.clone());
        }
    }

    /// Store path from the flag, then the environment, then the files.
    pub fn store_path(&self, flag: Option<&Path>) -> Option<PathBuf> {
        flag.map(Path::to_path_buf)
            .or_else(|| std::env::var(STORE_ENV).ok().filter(|s| !s.is_empty()).map(PathBuf::from))
            .or_else(|| self.store.as_ref().map(PathBuf::from))
    }

    pub fn log_level(&self, flag: Option<&str>) -> String {
        flag.map(str::to_string)
            .or_else(|| std::env::var(LOG_LEVEL_ENV).ok().filter(|s| !s.is_empty()))
            .or_else(|| self.log_level.clone())
            .unwrap_or_else(|| "warn".to_string())
    }

    pub fn training(&self) -> TrainingConfig {
        self.training.clone().unwrap_or_default()
    }
}
