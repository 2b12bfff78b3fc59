//! TOML configuration file parsing and loading
//!
//! This module handles discovery of the default config file, loading it as
//! a raw `toml::Table`, and applying its top-level keys to [`Args`]. The
//! `[pipeline]` table is parsed separately into
//! [`PipelineSettings`](crate::pubsub::api::PipelineSettings).

use crate::core::error_handling::ContextualError;
use std::path::{Path, PathBuf};

use super::args::Args;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file does not exist: {}", path.display())]
    Missing { path: PathBuf },

    #[error("could not read configuration file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse configuration file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for '{key}' in configuration file: {message}")]
    Invalid { key: String, message: String },
}

impl ContextualError for ConfigError {
    fn is_user_actionable(&self) -> bool {
        true
    }

    fn user_message(&self) -> Option<String> {
        Some(self.to_string())
    }

    fn message_id(&self) -> &'static str {
        match self {
            ConfigError::Missing { .. } => "C0001",
            ConfigError::Read { .. } => "C0002",
            ConfigError::Parse { .. } => "C0003",
            ConfigError::Invalid { .. } => "C0004",
        }
    }
}

/// `<config dir>/Fanout/fanout.toml`, if the platform has a config dir
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("Fanout").join("fanout.toml"))
}

/// Decide which config file to load
///
/// An explicitly requested file must exist; the default file is optional.
pub fn locate_config(explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    match explicit {
        Some(path) if path.exists() => Ok(Some(path.to_path_buf())),
        Some(path) => Err(ConfigError::Missing {
            path: path.to_path_buf(),
        }),
        None => Ok(default_config_path().filter(|path| path.exists())),
    }
}

pub fn load_config(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str::<toml::Table>(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        message: message.into(),
    }
}

fn count_field(config: &toml::Table, key: &str) -> Result<Option<usize>, ConfigError> {
    match config.get(key) {
        None => Ok(None),
        Some(value) => {
            let count = value
                .as_integer()
                .ok_or_else(|| invalid(key, "expected an integer"))?;
            usize::try_from(count)
                .map(Some)
                .map_err(|_| invalid(key, format!("{} is negative", count)))
        }
    }
}

fn string_field<'a>(config: &'a toml::Table, key: &str) -> Result<Option<&'a str>, ConfigError> {
    match config.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| invalid(key, "expected a string")),
    }
}

impl Args {
    /// Load the config file named on the command line, or the default one
    ///
    /// Returns the raw table so that other sections can be parsed by their
    /// owners. Values from the file only fill options the command line left
    /// unset.
    pub fn apply_config_file(&mut self) -> Result<Option<toml::Table>, ConfigError> {
        let Some(path) = locate_config(self.config_file.as_deref())? else {
            return Ok(None);
        };
        log::debug!("loading configuration from {}", path.display());
        let config = load_config(&path)?;
        self.apply_toml_values(&config)?;
        Ok(Some(config))
    }

    /// Apply top-level TOML configuration values to unset options
    pub fn apply_toml_values(&mut self, config: &toml::Table) -> Result<(), ConfigError> {
        if self.log_level.is_none() {
            self.log_level = string_field(config, "log-level")?.map(str::to_string);
        }
        if self.log_format.is_none() {
            self.log_format = string_field(config, "log-format")?.map(str::to_string);
        }
        if self.log_file.is_none() {
            self.log_file = string_field(config, "log-file")?.map(PathBuf::from);
        }
        if !self.color && !self.no_color {
            match config.get("color").map(|v| v.as_bool()) {
                Some(Some(color)) => {
                    self.color = color;
                    self.no_color = !color;
                }
                Some(None) => return Err(invalid("color", "expected true or false")),
                None => {}
            }
        }

        if self.readings.is_none() {
            self.readings = count_field(config, "readings")?;
        }
        if self.sensors.is_none() {
            self.sensors = count_field(config, "sensors")?;
        }
        if self.summary_every.is_none() {
            self.summary_every = count_field(config, "summary-every")?;
        }
        if self.alarm_threshold.is_none() {
            self.alarm_threshold = match config.get("alarm-threshold") {
                None => None,
                Some(value) => Some(
                    value
                        .as_float()
                        .or_else(|| value.as_integer().map(|i| i as f64))
                        .ok_or_else(|| invalid("alarm-threshold", "expected a number"))?,
                ),
            };
        }
        Ok(())
    }
}
