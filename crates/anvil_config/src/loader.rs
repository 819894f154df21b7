//! Configuration file loading, environment overrides, and validation.

use crate::error::ConfigError;
use crate::types::AnvilConfig;
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the project directory.
pub const CONFIG_FILE_NAME: &str = "anvil.toml";

/// Loads `<project_dir>/anvil.toml`, falling back to defaults when it is absent,
/// then applies environment overrides.
pub fn load_config(project_dir: &Path) -> Result<AnvilConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE_NAME);
    let mut config = match std::fs::read_to_string(&config_path) {
        Ok(content) => load_config_from_str(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AnvilConfig::default(),
        Err(e) => return Err(e.into()),
    };
    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config)?;
    Ok(config)
}

/// Parses and validates a configuration from a string.
///
/// Useful for testing without filesystem dependencies. Environment overrides
/// are not applied.
pub fn load_config_from_str(content: &str) -> Result<AnvilConfig, ConfigError> {
    let config: AnvilConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Applies `ANVIL_DAEMON`, `ANVIL_RUN_DIR` and `ANVIL_COMPILER` overrides.
///
/// `lookup` abstracts the environment so tests don't mutate process state.
pub fn apply_env_overrides(
    config: &mut AnvilConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(value) = lookup("ANVIL_DAEMON") {
        config.daemon.enabled = parse_switch(&value).ok_or_else(|| ConfigError::InvalidEnv {
            var: "ANVIL_DAEMON".to_string(),
            value: value.clone(),
        })?;
    }
    if let Some(dir) = lookup("ANVIL_RUN_DIR").filter(|s| !s.is_empty()) {
        config.daemon.run_dir = Some(PathBuf::from(dir));
    }
    if let Some(path) = lookup("ANVIL_COMPILER").filter(|s| !s.is_empty()) {
        config.compiler.path = Some(PathBuf::from(path));
    }
    Ok(())
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

/// Validates that timing values are usable.
fn validate_config(config: &AnvilConfig) -> Result<(), ConfigError> {
    if config.daemon.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "daemon.poll_interval_ms must be positive".to_string(),
        ));
    }
    if config.daemon.reaper_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "daemon.reaper_interval_ms must be positive".to_string(),
        ));
    }
    if config.daemon.startup_timeout_ms < config.daemon.poll_interval_ms {
        return Err(ConfigError::ValidationError(
            "daemon.startup_timeout_ms must be at least daemon.poll_interval_ms".to_string(),
        ));
    }
    Ok(())
}
