//! # Tally Framework
//!
//! The plugin model of the Tally telemetry agent.
//!
//! This layer provides:
//! - The four plugin traits ([`Input`], [`Processor`], [`Aggregator`],
//!   [`Output`]) and the [`PluginRegistry`] of plugin types
//! - Link-time registration through `#[register_plugin(category, "name")]`
//! - Metrics and the [`Accumulator`] plugins write into
//! - Running-instance models: wrapper configurations, filters, IDs and
//!   lifecycle state
//! - The data-format capability (parsers and serializers)
//! - The [`AgentController`] interface the management surface drives
//!
//! The framework is built on `tally-core`, which supplies the configuration
//! binding and introspection engine every plugin type plugs into.

extern crate self as tally_framework;

pub mod controller;
pub mod error;
pub mod format;
pub mod metric;
pub mod models;
pub mod plugin;

pub use controller::AgentController;
pub use error::{FilterError, FormatError, PluginError, PluginResult};
pub use metric::{Accumulator, FieldValue, Metric};
pub use models::{
    AggregatorConfig, Filter, InputConfig, InvalidPluginId, OutputConfig, PluginId, PluginState,
    ProcessorConfig, ProcessorUnit, RunningAggregator, RunningInput, RunningOutput,
    RunningProcessor,
};
pub use plugin::{Aggregator, Category, Input, Output, PluginRegistry, Processor, UnknownCategory};

#[doc(hidden)]
pub use linkme;
pub use tally_macros::register_plugin;

/// Everything a plugin implementation needs.
pub mod prelude {
    pub use std::collections::BTreeMap;

    pub use async_trait::async_trait;
    pub use tally_core::{Configurable, Duration, Number, Size};

    pub use crate::error::{PluginError, PluginResult};
    pub use crate::format::{
        Parser, ParserFactory, ParserFuncInput, ParserInput, Serializer, SerializerOutput,
    };
    pub use crate::metric::{Accumulator, FieldValue, Metric};
    pub use crate::plugin::{Aggregator, Input, Output, Processor};
    pub use crate::register_plugin;
}
