//! Procedural macros for the Tally telemetry agent.
//!
//! This crate provides:
//!
//! - `#[derive(Configurable)]` - Generates the static type descriptor used to
//!   bind, describe and snapshot plugin configuration
//! - `#[register_plugin(category, "name")]` - Registers a plugin type with
//!   the link-time plugin registry
//!
//! # Configurable Derive Macro
//!
//! ```rust,ignore
//! use tally_core::{Configurable, Duration};
//!
//! #[derive(Default, Configurable)]
//! pub struct Ping {
//!     pub urls: Vec<String>,
//!     #[config(name = "ping_interval")]
//!     pub interval: Duration,
//!     #[config(flatten)]
//!     pub tls: TlsConfig,
//! }
//! ```

mod configurable;
mod register;

use proc_macro::TokenStream;
use syn::{DeriveInput, ItemStruct, parse_macro_input};

/// Derives `tally_core::Configurable` for a struct with named fields.
///
/// The struct must implement `Default`. Public fields are configurable;
/// private fields are only described when they carry an explicit name, and
/// are then reported as not settable. Fields holding functions or trait
/// objects are ignored.
///
/// # Attributes
///
/// - `#[config(name = "...")]` - Override the external name (`"-"` excludes
///   the field)
/// - `#[config(skip)]` - Exclude the field
/// - `#[config(flatten)]` - Address the nested object's fields as if they
///   were declared on this struct
/// - `#[config(format = "...")]` - Presentation hint reported in schemas
/// - `#[config(required)]` - Mark the field as required in schemas
#[proc_macro_derive(Configurable, attributes(config))]
pub fn derive_configurable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    configurable::derive_configurable(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Registers a plugin type in one of the four category registries.
///
/// # Example
///
/// ```rust,ignore
/// use tally_framework::register_plugin;
///
/// #[register_plugin(inputs, "cpu")]
/// #[derive(Default, Configurable)]
/// pub struct Cpu {
///     pub percpu: bool,
/// }
/// ```
#[proc_macro_attribute]
pub fn register_plugin(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as register::RegisterArgs);
    let item = parse_macro_input!(item as ItemStruct);
    register::register_plugin(args, item)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
