//! Error types for plugins and their collaborators.

use thiserror::Error;

/// Errors raised by data-format parsers and serializers.
#[derive(Debug, Error)]
pub enum FormatError {
    /// No parser or serializer is registered for the format.
    #[error("unknown data format '{0}'")]
    UnknownFormat(String),

    /// The format configuration is inconsistent.
    #[error("invalid {format} configuration: {reason}")]
    InvalidConfig {
        format: &'static str,
        reason: String,
    },

    /// Input could not be decoded.
    #[error("{format} parse error at line {line}: {reason}")]
    Parse {
        format: &'static str,
        line: usize,
        reason: String,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl FormatError {
    pub(crate) fn parse(format: &'static str, line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            format,
            line,
            reason: reason.into(),
        }
    }
}

/// A metric filter pattern failed to compile.
#[derive(Debug, Error)]
#[error("invalid pattern '{pattern}' in {option}: {source}")]
pub struct FilterError {
    pub option: &'static str,
    pub pattern: String,
    #[source]
    pub source: glob::PatternError,
}

/// Errors returned by plugin hooks.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The plugin rejected its configuration during initialisation.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Any other failure, already rendered to text.
    #[error("{0}")]
    Other(String),
}

impl PluginError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wraps an arbitrary error.
    pub fn other(err: impl std::fmt::Display) -> Self {
        Self::Other(err.to_string())
    }
}

/// Result type for plugin hooks.
pub type PluginResult<T> = Result<T, PluginError>;
