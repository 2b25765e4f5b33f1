//! Data-format capability.
//!
//! Inputs that decode raw data and outputs that encode metrics share their
//! format options with the plugin's own field set: the same request fields
//! are bound onto a [`ParserConfig`] or [`SerializerConfig`] defaulted to
//! the `influx` line protocol, and the resulting parser or serializer is
//! handed to the plugin before it is initialised.

pub mod line_protocol;
mod parser;
mod serializer;

pub use parser::{Parser, ParserConfig, ParserFactory, ParserFuncInput, ParserInput, new_parser};
pub use serializer::{Serializer, SerializerConfig, SerializerOutput, new_serializer};
