//! Configuration module for the qgate runtime.
//!
//! Layered loading through figment (defaults, files, `QGATE_*` environment
//! variables, programmatic merges) plus validation of the result.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BotConfig, GatewaySettings, HttpSettings, LogFormat, LogLevel, LogOutput, LogRotation,
    LoggingConfig, QgateConfig,
};
pub use validation::{validate_config, validate_shard_plan};
