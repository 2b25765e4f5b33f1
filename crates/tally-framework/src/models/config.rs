//! Per-kind wrapper configurations.
//!
//! Every running plugin carries, next to the plugin object, a wrapper
//! configuration holding the options the agent applies around it. The same
//! request fields that configure the plugin are bound onto its wrapper; the
//! filter options are flattened into the wrapper's own field set.

use std::collections::BTreeMap;

use tally_core::{Configurable, Duration};

use super::filter::Filter;

/// Options applied around an input.
#[derive(Debug, Clone, Default, Configurable)]
pub struct InputConfig {
    #[config(skip)]
    pub name: String,
    pub alias: String,
    /// Gather interval; the agent interval when zero.
    pub interval: Duration,
    pub precision: Duration,
    pub collection_jitter: Duration,
    pub name_override: String,
    pub measurement_prefix: String,
    pub measurement_suffix: String,
    pub tags: BTreeMap<String, String>,
    #[config(flatten)]
    pub filter: Filter,
}

impl InputConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// Options applied around an output.
#[derive(Debug, Clone, Default, Configurable)]
pub struct OutputConfig {
    #[config(skip)]
    pub name: String,
    pub alias: String,
    /// Flush interval; the agent flush interval when zero.
    pub flush_interval: Duration,
    pub flush_jitter: Duration,
    /// Batch size; the agent setting when zero.
    pub metric_batch_size: usize,
    /// Buffer limit; the agent setting when zero.
    pub metric_buffer_limit: usize,
    pub name_override: String,
    #[config(flatten)]
    pub filter: Filter,
}

impl OutputConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// Options applied around a processor.
#[derive(Debug, Clone, Default, Configurable)]
pub struct ProcessorConfig {
    #[config(skip)]
    pub name: String,
    pub alias: String,
    pub order: i64,
    #[config(flatten)]
    pub filter: Filter,
}

impl ProcessorConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// Options applied around an aggregator.
#[derive(Debug, Clone, Configurable)]
pub struct AggregatorConfig {
    #[config(skip)]
    pub name: String,
    pub alias: String,
    /// Drop metrics the aggregator has seen instead of passing them on.
    pub drop_original: bool,
    pub period: Duration,
    pub delay: Duration,
    pub grace: Duration,
    pub name_override: String,
    pub measurement_prefix: String,
    pub measurement_suffix: String,
    pub tags: BTreeMap<String, String>,
    #[config(flatten)]
    pub filter: Filter,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            alias: String::new(),
            drop_original: false,
            period: Duration::from_secs(30),
            delay: Duration::from_millis(100),
            grace: Duration::ZERO,
            name_override: String::new(),
            measurement_prefix: String::new(),
            measurement_suffix: String::new(),
            tags: BTreeMap::new(),
            filter: Filter::default(),
        }
    }
}

impl AggregatorConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}
