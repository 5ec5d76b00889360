//! Configuration loading and env substitution.
//!
//! Config files: `botlink.toml`, `botlink.yaml`, `botlink.yml` or `botlink.json`.
//! Searched in `./` then the user config dir (`~/.config/botlink/` on Linux).
//!
//! Supports `${ENV_VAR}` substitution in all string values, plus a handful of
//! `BOTLINK_*` overrides applied after parsing.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{
        apply_env_overrides, config_dir, discover_and_load, find_config_file, load_config,
        parse_config,
    },
    schema::{
        BotConfig, DispatchConfig, GatewayConfig, MetricsConfig, OwnerConfig, PluginsConfig,
        SchedulerConfig, StorageConfig,
    },
};
