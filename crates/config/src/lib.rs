//! Configuration loading, validation, and env substitution.
//!
//! Config files: `relay.toml`, `relay.yaml`, `relay.yml`, or `relay.json`,
//! searched in `./` then the user config directory.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-fallback}` in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{
        apply_env_overrides, apply_env_overrides_with, config_dir, data_dir,
        default_config_path, discover_and_load, find_config_file, load_config,
    },
    schema::{
        AuditConfig, AuthConfig, BridgeConfig, DedupConfig, RelayConfig, ReplyConfig,
        SidecarConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult},
};
