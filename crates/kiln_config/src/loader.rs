//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::{KilnConfig, Limits};
use std::path::Path;

/// Name of the configuration file looked up in a project directory.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Loads and validates a `kiln.toml` configuration file.
///
/// `path` may name the file itself or a directory containing `kiln.toml`.
pub fn load_config(path: &Path) -> Result<KilnConfig, ConfigError> {
    let config_path = if path.is_dir() {
        path.join(CONFIG_FILE)
    } else {
        path.to_path_buf()
    };
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `kiln.toml` configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<KilnConfig, ConfigError> {
    let config: KilnConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates cross-field consistency of a parsed configuration.
pub fn validate_config(config: &KilnConfig) -> Result<(), ConfigError> {
    if config.device.name.trim().is_empty() {
        return Err(ConfigError::MissingField("device.name".to_string()));
    }
    if config.device.max_live_modules == Some(0) {
        return Err(ConfigError::ValidationError(
            "device.max_live_modules must be at least 1".to_string(),
        ));
    }
    validate_limits(&config.limits)
}

fn validate_limits(limits: &Limits) -> Result<(), ConfigError> {
    for (field, value) in [
        ("limits.min_subgroup_size", limits.min_subgroup_size),
        ("limits.max_subgroup_size", limits.max_subgroup_size),
    ] {
        if !value.is_power_of_two() {
            return Err(ConfigError::ValidationError(format!(
                "{field} must be a non-zero power of two, got {value}"
            )));
        }
    }
    if limits.min_subgroup_size > limits.max_subgroup_size {
        return Err(ConfigError::ValidationError(format!(
            "limits.min_subgroup_size ({}) exceeds limits.max_subgroup_size ({})",
            limits.min_subgroup_size, limits.max_subgroup_size
        )));
    }
    for (field, value) in [
        ("limits.max_compute_workgroup_size_x", limits.max_compute_workgroup_size_x),
        ("limits.max_compute_workgroup_size_y", limits.max_compute_workgroup_size_y),
        ("limits.max_compute_workgroup_size_z", limits.max_compute_workgroup_size_z),
        (
            "limits.max_compute_invocations_per_workgroup",
            limits.max_compute_invocations_per_workgroup,
        ),
    ] {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!("{field} must be non-zero")));
        }
    }
    Ok(())
}
