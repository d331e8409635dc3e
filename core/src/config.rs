//! Configuration loading and validation for the harness
//!
//! A TOML file is parsed into `schema::HarnessConfig` (serde defaults fill in
//! whatever the file leaves out) and then validated with field-path error
//! messages.

use crate::{CoreError, Result};
use schema::HarnessConfig;
use std::fs;
use std::path::Path;
use tracing::debug;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Load harness config from a TOML file path
pub fn load_config_from_toml_path(path: impl AsRef<Path>) -> Result<HarnessConfig> {
    let data = fs::read_to_string(&path).map_err(|e| {
        CoreError::ConfigurationError(format!("Failed to read config {:?}: {}", path.as_ref(), e))
    })?;
    load_config_from_toml_str(&data)
}

/// Load harness config from a TOML string
pub fn load_config_from_toml_str(input: &str) -> Result<HarnessConfig> {
    let cfg: HarnessConfig = toml::from_str(input)
        .map_err(|e| CoreError::ConfigurationError(format!("TOML parse error: {}", e)))?;
    validate_config(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration, whatever its source
pub fn validate_config(cfg: &HarnessConfig) -> Result<()> {
    if cfg.command.trim().is_empty() {
        return Err(CoreError::ValidationError(
            "command: cannot be empty".to_string(),
        ));
    }
    if let Some(dir) = &cfg.working_directory {
        if dir.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "workingDirectory: cannot be empty when set".to_string(),
            ));
        }
    }
    if !cfg.address.starts_with("https://") || cfg.address.len() == "https://".len() {
        return Err(CoreError::ValidationError(format!(
            "address: must be an https:// URL, got {:?}",
            cfg.address
        )));
    }
    if cfg.handshake_timeout_secs == Some(0) {
        return Err(CoreError::ValidationError(
            "handshakeTimeoutSecs: must be > 0 (omit it to wait forever)".to_string(),
        ));
    }
    if !LOG_LEVELS.contains(&cfg.log_level.as_str()) {
        return Err(CoreError::ValidationError(format!(
            "logLevel: must be one of {}, got {:?}",
            LOG_LEVELS.join(", "),
            cfg.log_level
        )));
    }

    debug!("Configuration validated successfully");
    Ok(())
}
