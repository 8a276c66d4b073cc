//! TOML configuration file loading
//!
//! Looks for `--config-file`, falling back to
//! `<config dir>/QueueListener/queue-listener.toml` when it exists. Container
//! options live in the `[container]` table.

use queue_listener::listener::{ContainerError, ContainerOptions};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("The specified configuration file does not exist: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Error reading configuration file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error parsing configuration file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Error in configuration file: {0}")]
    Invalid(#[from] ContainerError),
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("QueueListener").join("queue-listener.toml"))
}

/// Load the raw TOML configuration, if there is any
///
/// An explicitly given file must exist; the default file is optional.
pub async fn load_config(config_file: Option<&Path>) -> Result<Option<toml::Table>, ConfigError> {
    let path = match config_file {
        Some(path) if !path.exists() => {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            })
        }
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(None),
        },
    };

    log::debug!("Loading configuration from {}", path.display());
    let contents = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
    let config = toml::from_str::<toml::Table>(&contents)
        .map_err(|source| ConfigError::Parse { path, source })?;
    Ok(Some(config))
}

/// Container options from the `[container]` table, or the defaults
pub fn container_options(config: Option<&toml::Table>) -> Result<ContainerOptions, ConfigError> {
    let table = config
        .and_then(|config| config.get("container"))
        .and_then(|value| value.as_table());
    match table {
        Some(table) => Ok(ContainerOptions::from_toml(table)?),
        None => Ok(ContainerOptions::default()),
    }
}
