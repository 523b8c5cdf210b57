//! Configuration loader for docstate.
//!
//! Reads `config.toml` from the data directory (`~/.docstate/` in production)
//! and deserializes it into [`DocstateConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use docstate_types::config::DocstateConfig;
use docstate_types::error::ConfigError;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "DOCSTATE_DATA_DIR";

pub const CONFIG_FILE: &str = "config.toml";

/// Resolve the data directory.
///
/// Priority: `DOCSTATE_DATA_DIR`, then `~/.docstate`, then `./.docstate`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".docstate");
    }

    PathBuf::from(".docstate")
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`DocstateConfig::default()`].
/// - If the file exists but fails to read or parse, logs a warning and returns the default.
/// - Otherwise returns the parsed config (the `[storage]` and `[backend]` tables).
pub async fn load_storage_config(data_dir: &Path) -> DocstateConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return DocstateConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return DocstateConfig::default();
        }
    };

    match parse_config(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("{}: {err}, using defaults", config_path.display());
            DocstateConfig::default()
        }
    }
}

/// Parse and validate `config.toml` contents.
pub fn parse_config(content: &str) -> Result<DocstateConfig, ConfigError> {
    let config: DocstateConfig =
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    config.storage.validate()?;
    Ok(config)
}

/// Write `config` to `{data_dir}/config.toml`, creating the directory.
pub async fn write_storage_config(
    data_dir: &Path,
    config: &DocstateConfig,
) -> Result<PathBuf, ConfigError> {
    let content = toml::to_string_pretty(config).map_err(|e| ConfigError::Parse(e.to_string()))?;
    tokio::fs::create_dir_all(data_dir).await?;
    let path = data_dir.join(CONFIG_FILE);
    tokio::fs::write(&path, content).await?;
    Ok(path)
}
