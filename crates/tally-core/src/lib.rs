//! # Tally Core
//!
//! The configuration binding and introspection engine of the Tally
//! telemetry agent.
//!
//! Plugin configuration types describe themselves through a static
//! [`ObjectDescriptor`] (generated by `#[derive(Configurable)]`). On top of
//! that capability this crate provides four operations that work on any
//! well-formed configuration type:
//!
//! - **Resolution** ([`resolve`]): find the field answering to an external
//!   name, looking through embedded objects.
//! - **Binding** ([`bind`]): apply an untyped field set onto a typed object,
//!   coercing each value into its slot's kind.
//! - **Schema derivation** ([`derive_schema`]): describe every configurable
//!   field of a type as a [`FieldSchema`] tree.
//! - **Extraction** ([`extract`]): snapshot a live object into an untyped
//!   field set.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tally_core::{Configurable, Duration, bind, derive_schema, extract};
//!
//! #[derive(Default, Configurable)]
//! pub struct Ping {
//!     pub urls: Vec<String>,
//!     pub timeout: Duration,
//! }
//!
//! let schema = derive_schema(&Ping::default())?;
//! let mut ping = Ping::default();
//! bind(&mut ping, request.as_object().unwrap())?;
//! let snapshot = extract(&ping);
//! ```

extern crate self as tally_core;

pub mod bind;
pub mod coerce;
pub mod descriptor;
pub mod error;
pub mod extract;
pub mod naming;
pub mod resolve;
pub mod scalar;
pub mod schema;

/// An untyped field set keyed by external name.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

pub use bind::{assign_object, bind};
pub use descriptor::{
    ConfigValue, Configurable, Describe, FieldDescriptor, ObjectDescriptor, Shape,
};
pub use error::{
    BindError, BindErrorKind, BindResult, FieldPath, PathSegment, SchemaError, SchemaResult,
};
pub use extract::extract;
pub use naming::external_name;
pub use resolve::{Resolved, resolve};
pub use scalar::{Duration, Number, ParseDurationError, ParseSizeError, Size};
pub use schema::{FieldSchema, FieldType, derive as derive_schema};

pub use tally_macros::Configurable;

#[doc(hidden)]
pub mod __private {
    pub use crate::extract::{is_zero_object, snapshot_object};
    pub use serde_json::Value;
}
