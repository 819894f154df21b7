//! Loading of `anvil.toml` and environment overrides.
//!
//! This crate reads the optional configuration file and produces a strongly-typed
//! [`AnvilConfig`] with defaults for every setting, so an absent file is a valid
//! configuration.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{apply_env_overrides, load_config, load_config_from_str, CONFIG_FILE_NAME};
pub use types::*;
