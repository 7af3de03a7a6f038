//! Parsing and validation of `kiln.toml` configuration files.
//!
//! This crate reads the configuration file and produces a strongly-typed
//! [`KilnConfig`] carrying the device description, the device-wide
//! [`Toggles`] and [`Limits`] consulted during compilation, and blob-store
//! settings.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, validate_config, CONFIG_FILE};
pub use types::*;
