//! Plugin traits and the plugin type registry.
//!
//! A plugin is a configuration type (see [`Configurable`]) with behaviour
//! attached by one of four category traits:
//!
//! | Category | Trait | Behaviour |
//! |----------|-------|-----------|
//! | `inputs` | [`Input`] | gathers metrics on an interval |
//! | `processors` | [`Processor`] | transforms metrics in flight |
//! | `aggregators` | [`Aggregator`] | folds metrics over a period |
//! | `outputs` | [`Output`] | writes metric batches |
//!
//! ```rust,ignore
//! use tally_framework::prelude::*;
//!
//! #[register_plugin(inputs, "uptime")]
//! #[derive(Default, Configurable)]
//! pub struct Uptime {
//!     pub unit: String,
//! }
//!
//! #[async_trait]
//! impl Input for Uptime {
//!     async fn gather(&mut self, acc: &mut Accumulator) -> PluginResult<()> {
//!         acc.add_fields("uptime", [("seconds", 42i64)], BTreeMap::new());
//!         Ok(())
//!     }
//! }
//! ```

mod registry;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use tally_core::Configurable;

use crate::error::PluginResult;
use crate::format::{ParserFuncInput, ParserInput, SerializerOutput};
use crate::metric::{Accumulator, Metric};

pub use registry::{
    AGGREGATOR_REGISTRY, AggregatorFactory, Factory, INPUT_REGISTRY, InputFactory,
    OUTPUT_REGISTRY, OutputFactory, PROCESSOR_REGISTRY, PluginRegistry, ProcessorFactory,
    Registration,
};

// ─── Category ───────────────────────────────────────────────────────────────

/// The four plugin categories, in catalogue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Inputs,
    Processors,
    Aggregators,
    Outputs,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Inputs,
        Category::Processors,
        Category::Aggregators,
        Category::Outputs,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Inputs => "inputs",
            Category::Processors => "processors",
            Category::Aggregators => "aggregators",
            Category::Outputs => "outputs",
        }
    }

    /// Splits `category.name` into its parts.
    pub fn split_qualified(qualified: &str) -> Option<(Category, &str)> {
        let (category, name) = qualified.split_once('.')?;
        if name.is_empty() {
            return None;
        }
        Some((category.parse().ok()?, name))
    }

    /// Joins a category and a plugin name.
    pub fn qualify(self, name: &str) -> String {
        format!("{}.{name}", self.as_str())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for an unknown category name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown plugin category '{0}'")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

// ─── Plugin traits ──────────────────────────────────────────────────────────

/// A plugin that gathers metrics.
#[async_trait]
pub trait Input: Configurable {
    /// Validates configuration once after binding.
    fn init(&mut self) -> PluginResult<()> {
        Ok(())
    }

    /// Collects one round of metrics.
    async fn gather(&mut self, acc: &mut Accumulator) -> PluginResult<()>;

    /// Inputs that decode data with a configurable parser.
    fn as_parser_input(&mut self) -> Option<&mut dyn ParserInput> {
        None
    }

    /// Inputs that build parsers on demand.
    fn as_parser_func_input(&mut self) -> Option<&mut dyn ParserFuncInput> {
        None
    }
}

/// A plugin that writes metrics somewhere.
#[async_trait]
pub trait Output: Configurable {
    fn init(&mut self) -> PluginResult<()> {
        Ok(())
    }

    async fn connect(&mut self) -> PluginResult<()> {
        Ok(())
    }

    async fn write(&mut self, metrics: &[Metric]) -> PluginResult<()>;

    async fn close(&mut self) -> PluginResult<()> {
        Ok(())
    }

    /// Outputs that encode data with a configurable serializer.
    fn as_serializer_output(&mut self) -> Option<&mut dyn SerializerOutput> {
        None
    }
}

/// A plugin that transforms metrics in flight.
pub trait Processor: Configurable {
    fn init(&mut self) -> PluginResult<()> {
        Ok(())
    }

    fn apply(&mut self, metrics: Vec<Metric>) -> Vec<Metric>;
}

/// A plugin that folds metrics over a period.
pub trait Aggregator: Configurable {
    fn init(&mut self) -> PluginResult<()> {
        Ok(())
    }

    /// Observes one metric.
    fn add(&mut self, metric: &Metric);

    /// Emits the aggregates for the current period.
    fn push(&mut self, acc: &mut Accumulator);

    /// Clears state at the end of a period.
    fn reset(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_qualified_names() {
        assert_eq!(
            Category::split_qualified("inputs.cpu"),
            Some((Category::Inputs, "cpu"))
        );
        assert_eq!(
            Category::split_qualified("outputs.influxdb.v2"),
            Some((Category::Outputs, "influxdb.v2"))
        );
        assert_eq!(Category::split_qualified("bogus.nothing"), None);
        assert_eq!(Category::split_qualified("inputs"), None);
        assert_eq!(Category::split_qualified("inputs."), None);
    }

    #[test]
    fn qualify_round_trips() {
        for category in Category::ALL {
            let qualified = category.qualify("x");
            assert_eq!(Category::split_qualified(&qualified), Some((category, "x")));
        }
    }
}
