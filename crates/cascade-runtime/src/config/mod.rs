//! Configuration module for the Cascade runtime.
//!
//! Layered loading (defaults, files, environment, overrides) lives in
//! [`loader`]; the schema in [`schema`]; sanity checks in [`validation`].

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config};
pub use schema::{
    CascadeConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, RuntimeConfig, SpanEventConfig,
};
pub use validation::validate_config;
