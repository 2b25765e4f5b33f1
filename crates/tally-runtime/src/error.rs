//! Runtime error types.

use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;

/// Errors that can occur while bootstrapping or running the agent.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A plugin request from the bootstrap set failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Signal handling or file access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
