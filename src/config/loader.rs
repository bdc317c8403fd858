//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::NodeConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError + '_ {
    move |source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Load `<home>/config/app.toml`, falling back to defaults when it is absent.
///
/// The result is not validated: command line overrides are applied first.
pub fn load_config(home: &Path) -> Result<NodeConfig, ConfigError> {
    let mut config = NodeConfig::with_home(home);
    let path = config.app_config_file();
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No app.toml found, using defaults");
        return Ok(config);
    }

    let content = fs::read_to_string(&path).map_err(io_error(&path))?;
    config = toml::from_str(&content)?;
    config.home = home.to_path_buf();
    Ok(config)
}

/// Validate a fully assembled configuration.
pub fn finalize_config(config: NodeConfig) -> Result<NodeConfig, ConfigError> {
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Write the configuration to `<home>/config/app.toml`.
pub fn write_config(config: &NodeConfig) -> Result<(), ConfigError> {
    let dir = config.config_dir();
    fs::create_dir_all(&dir).map_err(io_error(&dir))?;
    let path = config.app_config_file();
    let content = toml::to_string_pretty(config)?;
    fs::write(&path, content).map_err(io_error(&path))
}
