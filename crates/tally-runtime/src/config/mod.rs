//! Configuration module for the Tally runtime.
//!
//! Layered loading (defaults, files, environment) through `figment`, the
//! configuration schema and its validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile};
pub use schema::{
    AgentConfig, ApiConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    SpanEventConfig, TallyConfig,
};
pub use validation::validate_config;
