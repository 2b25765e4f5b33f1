//! Error types for the binding engine.

use std::fmt;

use thiserror::Error;

use crate::scalar::{ParseDurationError, ParseSizeError};

// ─── Field paths ────────────────────────────────────────────────────────────

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A named field or map key.
    Key(String),
    /// A sequence index.
    Index(usize),
}

/// Location of a value inside a nested field set, rendered as `a.b[2].c`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    /// Returns the segments from the outermost field inwards.
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Returns `true` when the path points at the value itself.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn prepend(&mut self, segment: PathSegment) {
        self.0.insert(0, segment);
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if position == 0 => f.write_str(key)?,
                PathSegment::Key(key) => write!(f, ".{key}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

// ─── Binding ────────────────────────────────────────────────────────────────

/// What went wrong while assigning a value to a slot.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindErrorKind {
    /// The source value has no coercion into the destination kind.
    #[error("cannot assign {found} to {expected}")]
    Mismatch {
        /// Destination kind.
        expected: &'static str,
        /// Kind of the supplied value.
        found: &'static str,
    },

    /// An integer source does not fit the destination width.
    #[error("{value} is out of range for {target}")]
    OutOfRange {
        /// The offending value as text.
        value: String,
        /// Destination integer type.
        target: &'static str,
    },

    /// A string could not be parsed as a duration.
    #[error(transparent)]
    InvalidDuration(#[from] ParseDurationError),

    /// A string could not be parsed as a byte size.
    #[error(transparent)]
    InvalidSize(#[from] ParseSizeError),

    /// The field exists but cannot be written to.
    #[error("field is not settable")]
    Unsettable,
}

/// A failed bind, carrying the path of the field that rejected its value.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct BindError {
    path: FieldPath,
    kind: BindErrorKind,
}

impl BindError {
    /// Creates an error located at the value itself.
    pub fn new(kind: impl Into<BindErrorKind>) -> Self {
        Self {
            path: FieldPath::default(),
            kind: kind.into(),
        }
    }

    /// Convenience constructor for a kind mismatch.
    pub fn mismatch(expected: &'static str, found: &serde_json::Value) -> Self {
        Self::new(BindErrorKind::Mismatch {
            expected,
            found: kind_of(found),
        })
    }

    /// Prefixes the path with a field name or map key.
    pub fn at_key(mut self, key: impl Into<String>) -> Self {
        self.path.prepend(PathSegment::Key(key.into()));
        self
    }

    /// Prefixes the path with a sequence index.
    pub fn at_index(mut self, index: usize) -> Self {
        self.path.prepend(PathSegment::Index(index));
        self
    }

    /// Path of the rejecting field.
    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    /// The underlying failure.
    pub fn kind(&self) -> &BindErrorKind {
        &self.kind
    }
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "field '{}': {}", self.path, self.kind)
        }
    }
}

/// Result type for binding operations.
pub type BindResult<T> = Result<T, BindError>;

/// Short name of an untyped value's kind, used in error messages.
pub fn kind_of(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;

    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ─── Schema derivation ──────────────────────────────────────────────────────

/// A configuration type whose shape cannot be described.
///
/// This is a defect in the plugin type rather than in the request, so it
/// fails a whole type listing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A visible field has a kind with no schema representation.
    #[error("{type_name}.{field}: unrecognized field kind '{detail}'")]
    UnrecognizedKind {
        /// Declaring type.
        type_name: &'static str,
        /// Declared field identifier.
        field: &'static str,
        /// Description of the offending kind.
        detail: &'static str,
    },
}

/// Result type for schema derivation.
pub type SchemaResult<T> = Result<T, SchemaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_rendering() {
        let err = BindError::new(BindErrorKind::Unsettable)
            .at_key("c")
            .at_index(2)
            .at_key("b")
            .at_key("a");
        assert_eq!(err.path().to_string(), "a.b[2].c");
        assert_eq!(err.to_string(), "field 'a.b[2].c': field is not settable");
    }

    #[test]
    fn mismatch_names_found_kind() {
        let err = BindError::mismatch("bool", &serde_json::json!(1.5));
        assert_eq!(
            err.kind(),
            &BindErrorKind::Mismatch {
                expected: "bool",
                found: "float"
            }
        );
        assert_eq!(err.to_string(), "cannot assign float to bool");
    }
}
