//! Configuration loader.
//!
//! Pipeline for both game configuration and scenario files:
//! 1. Size check against [`ConfigLimits`]
//! 2. YAML parsing (errors carry the line number)
//! 3. Deserialization to the typed schema
//! 4. Semantic validation, collecting every issue
//! 5. Freeze with `Arc`

use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use inboxwars_core::config::{GameConfig, ScenarioConfig};

use super::validation::{ValidationResult, Validator};
use crate::error::{ConfigError, ValidationIssue};

/// Limits guarding the loader against oversized input.
#[derive(Debug, Clone)]
pub struct ConfigLimits {
    /// Maximum file size in bytes.
    pub max_config_size: usize,
}

impl Default for ConfigLimits {
    fn default() -> Self {
        Self {
            max_config_size: env_or("INBOXWARS_MAX_CONFIG_SIZE", 1024 * 1024),
        }
    }
}

/// A loaded, validated and frozen file.
#[derive(Debug)]
pub struct LoadResult<T> {
    /// The frozen configuration.
    pub config: Arc<T>,
    /// Warnings found while validating.
    pub warnings: Vec<ValidationIssue>,
}

/// Loads game configuration and scenario files.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    limits: ConfigLimits,
}

impl ConfigLoader {
    /// Creates a loader with explicit limits.
    #[must_use]
    pub const fn new(limits: ConfigLimits) -> Self {
        Self { limits }
    }

    /// Creates a loader with limits taken from the environment.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Loads and validates a game configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is missing, too large,
    /// malformed or fails validation.
    pub fn load_game_config(&self, path: &Path) -> Result<LoadResult<GameConfig>, ConfigError> {
        let config: GameConfig = self.parse(path)?;
        let result = Validator::new().validate_game_config(&config);
        finish(path, config, result)
    }

    /// Loads a scenario and validates it against `game`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is missing, too large,
    /// malformed or references unknown teams, destinations or clients.
    pub fn load_scenario(
        &self,
        path: &Path,
        game: &GameConfig,
    ) -> Result<LoadResult<ScenarioConfig>, ConfigError> {
        let scenario: ScenarioConfig = self.parse(path)?;
        let result = Validator::new().validate_scenario(&scenario, game);
        finish(path, scenario, result)
    }

    fn parse<T: DeserializeOwned>(&self, path: &Path) -> Result<T, ConfigError> {
        let metadata = std::fs::metadata(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;
        let size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        if size > self.limits.max_config_size {
            return Err(ConfigError::TooLarge {
                path: path.to_path_buf(),
                size,
                limit: self.limits.max_config_size,
            });
        }

        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;
        let raw = raw.strip_prefix('\u{feff}').unwrap_or(&raw);

        let value: serde_yaml::Value =
            serde_yaml::from_str(raw).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?;
        if value.is_null() {
            return Err(ConfigError::ParseError {
                path: path.to_path_buf(),
                line: None,
                message: "Configuration file is empty".to_string(),
            });
        }

        serde_yaml::from_value(value).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            line: e.location().map(|l| l.line()),
            message: format!("Failed to deserialize configuration: {e}"),
        })
    }
}

fn finish<T>(path: &Path, config: T, result: ValidationResult) -> Result<LoadResult<T>, ConfigError> {
    if result.has_errors() {
        return Err(ConfigError::ValidationError {
            path: path.display().to_string(),
            errors: result.errors,
        });
    }
    for warning in &result.warnings {
        tracing::warn!(file = %path.display(), "{warning}");
    }
    Ok(LoadResult {
        config: Arc::new(config),
        warnings: result.warnings,
    })
}

/// Parses an environment variable with a default value.
fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
