//! Worker configuration.
//!
//! Settings are layered with figment (defaults, files, `SHARDLINE_*`
//! environment variables, programmatic merges) and checked by
//! [`validate_config`] before the worker starts.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BrokerConfig, CommandsConfig, HttpConfig, LogFormat, LogLevel, LogOutput, LoggingConfig,
    SpanEventConfig, WorkerConfig,
};
pub use validation::validate_config;
