//! Configuration loading, validation, and env substitution.
//!
//! Config files: `gatehouse.toml`, `gatehouse.yaml`, or `gatehouse.json`
//! Searched in `./` then `~/.config/gatehouse/`.
//!
//! String values may hold `${ENV_VAR}` or `${ENV_VAR:-default}` placeholders,
//! resolved after parsing. `GATEHOUSE_TOKEN` and `GATEHOUSE_DATABASE_URL`
//! override the file.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{apply_env_overrides, config_dir, discover_and_load, find_config_file, load_config},
    schema::{
        BotConfig, GatehouseConfig, GuildConfig, InterviewsConfig, ModerationConfig,
        SubsystemsConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult},
};
