//! Errors returned by the plugin management API.

use std::fmt;

use tally_core::{BindError, SchemaError};
use tally_framework::PluginId;
use thiserror::Error;

/// Outcome class of a failed API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown plugin type or instance.
    NotFound,
    /// The request fields could not be applied.
    BadRequest,
    /// An update waited too long for the old instance to stop.
    Timeout,
    /// The manager shut down during the call.
    Cancelled,
    /// A plugin type cannot be described; a defect in the plugin.
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors of [`ConfigApi`](super::ConfigApi) operations.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{what} '{name}' not found")]
    NotFound { what: &'static str, name: String },

    #[error("{plugin}: {}{reason}", field_prefix(.field))]
    BadRequest {
        /// Qualified plugin type name.
        plugin: String,
        /// Path of the rejecting field, when one is known.
        field: Option<String>,
        reason: String,
    },

    #[error("timed out after {waited} waiting for plugin {id} to stop")]
    Timeout {
        id: PluginId,
        waited: tally_core::Duration,
    },

    #[error("cancelled while updating plugin {id}")]
    Cancelled { id: PluginId },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

fn field_prefix(field: &Option<String>) -> String {
    match field {
        Some(field) => format!("field '{field}': "),
        None => String::new(),
    }
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::NotFound { .. } => ErrorKind::NotFound,
            ApiError::BadRequest { .. } => ErrorKind::BadRequest,
            ApiError::Timeout { .. } => ErrorKind::Timeout,
            ApiError::Cancelled { .. } => ErrorKind::Cancelled,
            ApiError::Schema(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn unknown_type(type_name: &str) -> Self {
        Self::NotFound {
            what: "plugin type",
            name: type_name.to_string(),
        }
    }

    pub(crate) fn unknown_instance(id: impl fmt::Display) -> Self {
        Self::NotFound {
            what: "plugin",
            name: id.to_string(),
        }
    }

    /// A bind failure, keeping the path of the rejecting field.
    pub(crate) fn bind(plugin: &str, err: BindError) -> Self {
        let field = (!err.path().is_empty()).then(|| err.path().to_string());
        Self::BadRequest {
            plugin: plugin.to_string(),
            field,
            reason: err.kind().to_string(),
        }
    }

    pub(crate) fn bad_request(plugin: &str, reason: impl fmt::Display) -> Self {
        Self::BadRequest {
            plugin: plugin.to_string(),
            field: None,
            reason: reason.to_string(),
        }
    }
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
