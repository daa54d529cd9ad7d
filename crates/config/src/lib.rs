//! Configuration loading, validation, and environment overrides.
//!
//! Config files: `groupcast.toml`, `groupcast.yaml`, or `groupcast.json`
//! Searched in `./` then `~/.config/groupcast/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in all
//! string values.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{
        apply_env_overrides, config_dir, discover_and_load, find_config_file, load, load_config,
    },
    schema::{DriverConfig, GroupcastConfig, ServerConfig, WhatsAppConfig},
};
