//! Configuration persistence
//!
//! [`RuntimeConfig`](super::RuntimeConfig) is stored as pretty-printed JSON.
//! Writes go through a temporary file and a rename so readers never observe
//! a partially written file.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;

use super::RuntimeConfig;
use super::error::ConfigError;

/// Load and validate configuration from `path`.
pub fn load_config(path: &Path) -> Result<RuntimeConfig> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()).into());
    }

    let data = fs::read(path).with_context(|| format!("Failed to read config: {:?}", path))?;
    let config: RuntimeConfig =
        serde_json::from_slice(&data).context("Failed to deserialize config")?;
    validate(&config)?;
    Ok(config)
}

/// Load configuration from `path` when given, defaults otherwise.
pub fn load_or_default(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(RuntimeConfig::default()),
    }
}

/// Write configuration to `path` atomically.
pub fn write_config(path: &Path, config: &RuntimeConfig) -> Result<()> {
    validate(config)?;
    let json = serde_json::to_vec_pretty(config).context("Failed to serialize config")?;
    write_atomic(path, &json)
}

fn validate(config: &RuntimeConfig) -> Result<(), ConfigError> {
    if let Some(listen) = &config.listen {
        listen.parse::<SocketAddr>().map_err(|err| {
            ConfigError::Invalid(format!("listen address '{listen}' is not valid: {err}"))
        })?;
    }
    Ok(())
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)
        .with_context(|| format!("Failed to create temp file: {:?}", temp_path))?;
    file.write_all(data).context("Failed to write config")?;
    file.sync_all().context("Failed to sync config")?;
    drop(file);

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;
    Ok(())
}
