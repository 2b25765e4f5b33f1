//! Static type descriptors.
//!
//! Every configuration type carries an [`ObjectDescriptor`] generated at
//! build time by `#[derive(Configurable)]`. The descriptor lists the
//! type's configurable fields in declaration order together with their
//! naming overrides and static [`Shape`]; the live object exposes those
//! fields by index through [`Configurable`].
//!
//! ```rust,ignore
//! use tally_core::{Configurable, Duration};
//!
//! #[derive(Default, Configurable)]
//! pub struct HttpInput {
//!     pub urls: Vec<String>,
//!     pub timeout: Duration,
//!     #[config(name = "tls_ca")]
//!     pub tls_ca_path: Option<String>,
//!     #[config(flatten)]
//!     pub client: ClientConfig,
//! }
//! ```

use std::borrow::Cow;
use std::fmt;

use serde_json::Value;

use crate::error::BindError;
use crate::naming;

// ─── Shapes ─────────────────────────────────────────────────────────────────

/// The static kind of a configurable value.
///
/// Nested kinds are referenced through function pointers so descriptors can
/// live in `static` items.
#[derive(Clone, Copy)]
pub enum Shape {
    String,
    Integer,
    Float,
    Bool,
    Duration,
    Size,
    /// An untyped value accepted verbatim.
    Any,
    /// A value that may be absent; allocated on first write.
    Optional(fn() -> Shape),
    /// A sequence of elements.
    Array(fn() -> Shape),
    /// A string-keyed collection.
    Map(fn() -> Shape),
    /// A structured object with its own descriptor.
    Object(&'static ObjectDescriptor),
    /// A kind with no configuration representation.
    Unknown(&'static str),
}

impl Shape {
    /// Strips any number of [`Shape::Optional`] wrappers.
    pub fn resolved(self) -> Shape {
        match self {
            Shape::Optional(inner) => inner().resolved(),
            other => other,
        }
    }

    /// Short human readable name of the kind.
    pub fn name(self) -> &'static str {
        match self {
            Shape::String => "string",
            Shape::Integer => "integer",
            Shape::Float => "float",
            Shape::Bool => "bool",
            Shape::Duration => "duration",
            Shape::Size => "size",
            Shape::Any => "any",
            Shape::Optional(_) => "optional",
            Shape::Array(_) => "array",
            Shape::Map(_) => "map",
            Shape::Object(_) => "object",
            Shape::Unknown(detail) => detail,
        }
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Optional(inner) => f.debug_tuple("Optional").field(&inner()).finish(),
            Shape::Array(inner) => f.debug_tuple("Array").field(&inner()).finish(),
            Shape::Map(inner) => f.debug_tuple("Map").field(&inner()).finish(),
            Shape::Object(descriptor) => f.debug_tuple("Object").field(&descriptor.type_name).finish(),
            Shape::Unknown(detail) => f.debug_tuple("Unknown").field(detail).finish(),
            other => f.write_str(other.name()),
        }
    }
}

/// Types with a statically known [`Shape`].
pub trait Describe {
    fn shape() -> Shape;
}

// ─── Descriptors ────────────────────────────────────────────────────────────

/// One configurable field of an object.
#[derive(Debug)]
pub struct FieldDescriptor {
    /// Declared identifier.
    pub ident: &'static str,
    /// Explicit external name; `"-"` excludes the field.
    pub rename: Option<&'static str>,
    /// Whether the field is public and may be written.
    pub visible: bool,
    /// Whether the field's own fields are addressed as if declared on the
    /// enclosing object.
    pub embedded: bool,
    /// Free-form presentation hint reported in schemas.
    pub format: Option<&'static str>,
    /// Whether the field must be supplied.
    pub required: bool,
    pub shape: fn() -> Shape,
}

impl FieldDescriptor {
    /// External name of the field, or `None` when excluded.
    pub fn external_name(&self) -> Option<Cow<'static, str>> {
        naming::external_name(self.ident, self.rename)
    }

    /// Returns `true` when the field is addressed by `name`.
    ///
    /// Non-public fields only answer to an explicit override.
    pub fn answers_to(&self, name: &str) -> bool {
        if !self.visible && self.rename.is_none() {
            return false;
        }
        self.external_name().is_some_and(|external| external == name)
    }
}

/// Static description of a configuration type.
pub struct ObjectDescriptor {
    /// Rust type name, used in diagnostics.
    pub type_name: &'static str,
    pub fields: &'static [FieldDescriptor],
    /// Builds a fresh default instance of the type.
    pub construct: fn() -> Box<dyn Configurable>,
}

impl fmt::Debug for ObjectDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectDescriptor")
            .field("type_name", &self.type_name)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

/// Constructor used by generated descriptors.
pub fn construct<T: Configurable + Default + 'static>() -> Box<dyn Configurable> {
    Box::new(T::default())
}

// ─── Value capabilities ─────────────────────────────────────────────────────

/// A value that can be written from and read into untyped form.
pub trait ConfigValue: Send + Sync {
    /// Coerces `source` into `self`.
    fn assign(&mut self, source: &Value) -> Result<(), BindError>;

    /// Renders the current value in untyped form.
    fn snapshot(&self) -> Value;

    /// Returns `true` when the value equals its kind's zero value.
    fn is_zero(&self) -> bool;

    fn as_configurable(&self) -> Option<&dyn Configurable> {
        None
    }

    fn as_configurable_mut(&mut self) -> Option<&mut dyn Configurable> {
        None
    }
}

/// A structured configuration object.
///
/// Implemented by `#[derive(Configurable)]`; field indices refer to
/// positions in [`ObjectDescriptor::fields`].
pub trait Configurable: ConfigValue {
    fn descriptor(&self) -> &'static ObjectDescriptor;

    /// Read access to a described field.
    fn field(&self, index: usize) -> Option<&dyn ConfigValue>;

    /// Write access to a described field; `None` for non-public fields.
    fn field_mut(&mut self, index: usize) -> Option<&mut dyn ConfigValue>;
}
