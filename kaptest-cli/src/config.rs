// kaptest-cli/src/config.rs
// ============================================================================
// Module: CLI Configuration
// Description: Optional TOML defaults for the kaptest binary.
// Purpose: Provide fail-closed config parsing with hard limits.
// Dependencies: crate::reporter, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! Configuration is optional: an explicit `--config` path must exist, the
//! `KAPTEST_CONFIG` environment variable overrides discovery, and
//! otherwise `kaptest.toml` in the working directory is used when
//! present. A missing file yields defaults; malformed or oversized files
//! fail closed. Command-line flags always override file values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::reporter::OutputFormat;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "kaptest.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "KAPTEST_CONFIG";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Top-level kaptest configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Output settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format; flags override it.
    #[serde(default)]
    pub format: Option<ConfigFormat>,
}

/// Output format names accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFormat {
    /// Quiet per-suite summary.
    Default,
    /// Per-test RUN/PASS/FAIL lines.
    Verbose,
    /// JSON events.
    Json,
}

impl From<ConfigFormat> for OutputFormat {
    fn from(format: ConfigFormat) -> Self {
        match format {
            ConfigFormat::Default => Self::Default,
            ConfigFormat::Verbose => Self::Verbose,
            ConfigFormat::Json => Self::Json,
        }
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl CliConfig {
    /// Loads configuration from the explicit path, the `KAPTEST_CONFIG`
    /// environment variable, or `kaptest.toml`; absent files yield
    /// defaults unless the path was explicit.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unreadable, oversized, or malformed
    /// files, and for an explicit path that does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match env::var(CONFIG_ENV_VAR) {
                Ok(env_path) if !env_path.is_empty() => (PathBuf::from(env_path), true),
                _ => (PathBuf::from(DEFAULT_CONFIG_NAME), false),
            },
        };

        if !path.exists() {
            if required {
                return Err(ConfigError::Missing {
                    path,
                });
            }
            return Ok(Self::default());
        }

        let metadata = fs::metadata(&path).map_err(|err| ConfigError::Read {
            path: path.clone(),
            detail: err.to_string(),
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::TooLarge {
                path,
                size: metadata.len(),
            });
        }

        let text = fs::read_to_string(&path).map_err(|err| ConfigError::Read {
            path: path.clone(),
            detail: err.to_string(),
        })?;
        toml::from_str(&text).map_err(|err| ConfigError::Parse {
            path,
            detail: err.to_string(),
        })
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Explicitly requested config file does not exist.
    #[error("config file not found: {path}", path = .path.display())]
    Missing {
        /// Requested path.
        path: PathBuf,
    },
    /// Config file could not be read.
    #[error("read config {path}: {detail}", path = .path.display())]
    Read {
        /// Requested path.
        path: PathBuf,
        /// Underlying diagnostic.
        detail: String,
    },
    /// Config file exceeds the size limit.
    #[error("config {path} is {size} bytes, over the {MAX_CONFIG_FILE_SIZE} byte limit", path = .path.display())]
    TooLarge {
        /// Requested path.
        path: PathBuf,
        /// Observed size in bytes.
        size: u64,
    },
    /// Config file is not valid TOML for the schema.
    #[error("parse config {path}: {detail}", path = .path.display())]
    Parse {
        /// Requested path.
        path: PathBuf,
        /// Parser diagnostic.
        detail: String,
    },
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = CliConfig::load(Some(Path::new("/nonexistent/kaptest.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { .. }));
    }

    #[test]
    fn format_names_parse_lowercase() {
        let config: CliConfig = toml::from_str("[output]\nformat = \"json\"\n").unwrap();
        assert_eq!(config.output.format, Some(ConfigFormat::Json));
        assert_eq!(OutputFormat::from(ConfigFormat::Json), OutputFormat::Json);
    }

    #[test]
    fn unknown_format_names_fail_closed() {
        let result: Result<CliConfig, _> = toml::from_str("[output]\nformat = \"loud\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn empty_config_yields_defaults() {
        let config: CliConfig = toml::from_str("").unwrap();
        assert_eq!(config, CliConfig::default());
    }
}
