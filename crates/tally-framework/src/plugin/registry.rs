use std::collections::BTreeMap;

use linkme::distributed_slice;
use tracing::{debug, warn};

use super::{Aggregator, Category, Input, Output, Processor};

/// Builds a fresh, default-configured plugin object.
pub type Factory<P> = fn() -> Box<P>;

pub type InputFactory = Factory<dyn Input>;
pub type OutputFactory = Factory<dyn Output>;
pub type ProcessorFactory = Factory<dyn Processor>;
pub type AggregatorFactory = Factory<dyn Aggregator>;

/// A link-time registration entry, emitted by `#[register_plugin]`.
pub struct Registration<F> {
    pub name: &'static str,
    pub create: F,
}

// ─── Link-time registries ───────────────────────────────────────────────────

/// Input plugins compiled into the binary.
#[distributed_slice]
pub static INPUT_REGISTRY: [Registration<InputFactory>];

/// Output plugins compiled into the binary.
#[distributed_slice]
pub static OUTPUT_REGISTRY: [Registration<OutputFactory>];

/// Processor plugins compiled into the binary.
#[distributed_slice]
pub static PROCESSOR_REGISTRY: [Registration<ProcessorFactory>];

/// Aggregator plugins compiled into the binary.
#[distributed_slice]
pub static AGGREGATOR_REGISTRY: [Registration<AggregatorFactory>];

// ─── PluginRegistry ─────────────────────────────────────────────────────────

/// Name → factory tables for every plugin category.
///
/// Built once at startup and shared by reference. Names enumerate in sorted
/// order.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    inputs: BTreeMap<String, InputFactory>,
    outputs: BTreeMap<String, OutputFactory>,
    processors: BTreeMap<String, ProcessorFactory>,
    aggregators: BTreeMap<String, AggregatorFactory>,
}

fn insert<F>(table: &mut BTreeMap<String, F>, category: Category, name: &str, factory: F) {
    if table.insert(name.to_string(), factory).is_some() {
        warn!(
            plugin = %category.qualify(name),
            "Duplicate plugin registration, last one wins"
        );
    }
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every plugin registered at link time.
    pub fn linked() -> Self {
        let mut registry = Self::new();
        for entry in INPUT_REGISTRY.iter() {
            registry.add_input(entry.name, entry.create);
        }
        for entry in PROCESSOR_REGISTRY.iter() {
            registry.add_processor(entry.name, entry.create);
        }
        for entry in AGGREGATOR_REGISTRY.iter() {
            registry.add_aggregator(entry.name, entry.create);
        }
        for entry in OUTPUT_REGISTRY.iter() {
            registry.add_output(entry.name, entry.create);
        }
        debug!(
            inputs = registry.inputs.len(),
            processors = registry.processors.len(),
            aggregators = registry.aggregators.len(),
            outputs = registry.outputs.len(),
            "Collected linked plugins"
        );
        registry
    }

    pub fn add_input(&mut self, name: &str, factory: InputFactory) -> &mut Self {
        insert(&mut self.inputs, Category::Inputs, name, factory);
        self
    }

    pub fn add_output(&mut self, name: &str, factory: OutputFactory) -> &mut Self {
        insert(&mut self.outputs, Category::Outputs, name, factory);
        self
    }

    pub fn add_processor(&mut self, name: &str, factory: ProcessorFactory) -> &mut Self {
        insert(&mut self.processors, Category::Processors, name, factory);
        self
    }

    pub fn add_aggregator(&mut self, name: &str, factory: AggregatorFactory) -> &mut Self {
        insert(&mut self.aggregators, Category::Aggregators, name, factory);
        self
    }

    /// Builder form of [`add_input`](Self::add_input).
    pub fn with_input(mut self, name: &str, factory: InputFactory) -> Self {
        self.add_input(name, factory);
        self
    }

    pub fn with_output(mut self, name: &str, factory: OutputFactory) -> Self {
        self.add_output(name, factory);
        self
    }

    pub fn with_processor(mut self, name: &str, factory: ProcessorFactory) -> Self {
        self.add_processor(name, factory);
        self
    }

    pub fn with_aggregator(mut self, name: &str, factory: AggregatorFactory) -> Self {
        self.add_aggregator(name, factory);
        self
    }

    pub fn input(&self, name: &str) -> Option<InputFactory> {
        self.inputs.get(name).copied()
    }

    pub fn output(&self, name: &str) -> Option<OutputFactory> {
        self.outputs.get(name).copied()
    }

    pub fn processor(&self, name: &str) -> Option<ProcessorFactory> {
        self.processors.get(name).copied()
    }

    pub fn aggregator(&self, name: &str) -> Option<AggregatorFactory> {
        self.aggregators.get(name).copied()
    }

    /// Registered names of a category, sorted.
    pub fn names(&self, category: Category) -> Vec<&str> {
        match category {
            Category::Inputs => self.inputs.keys().map(String::as_str).collect(),
            Category::Outputs => self.outputs.keys().map(String::as_str).collect(),
            Category::Processors => self.processors.keys().map(String::as_str).collect(),
            Category::Aggregators => self.aggregators.keys().map(String::as_str).collect(),
        }
    }

    /// Returns `true` when `category.name` is registered.
    pub fn contains(&self, category: Category, name: &str) -> bool {
        match category {
            Category::Inputs => self.inputs.contains_key(name),
            Category::Outputs => self.outputs.contains_key(name),
            Category::Processors => self.processors.contains_key(name),
            Category::Aggregators => self.aggregators.contains_key(name),
        }
    }

    /// Total number of registered plugin types.
    pub fn len(&self) -> usize {
        self.inputs.len() + self.outputs.len() + self.processors.len() + self.aggregators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tally_core::Configurable;

    use super::*;
    use crate::error::PluginResult;
    use crate::metric::{Accumulator, Metric};

    #[derive(Default, Configurable)]
    struct Noop {
        pub level: u8,
    }

    #[async_trait]
    impl Input for Noop {
        async fn gather(&mut self, _acc: &mut Accumulator) -> PluginResult<()> {
            Ok(())
        }
    }

    impl Processor for Noop {
        fn apply(&mut self, metrics: Vec<Metric>) -> Vec<Metric> {
            metrics
        }
    }

    fn noop_input() -> Box<dyn Input> {
        Box::new(Noop::default())
    }

    fn loud_input() -> Box<dyn Input> {
        Box::new(Noop { level: 9 })
    }

    fn noop_processor() -> Box<dyn Processor> {
        Box::new(Noop::default())
    }

    #[test]
    fn names_are_sorted_per_category() {
        let registry = PluginRegistry::new()
            .with_input("zeta", noop_input)
            .with_input("alpha", noop_input)
            .with_processor("rename", noop_processor);

        assert_eq!(registry.names(Category::Inputs), vec!["alpha", "zeta"]);
        assert_eq!(registry.names(Category::Processors), vec!["rename"]);
        assert!(registry.names(Category::Outputs).is_empty());
        assert!(registry.contains(Category::Processors, "rename"));
        assert!(!registry.contains(Category::Inputs, "rename"));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn last_registration_wins() {
        let registry = PluginRegistry::new()
            .with_input("noop", noop_input)
            .with_input("noop", loud_input);
        let factory = registry.input("noop").unwrap();
        let plugin = factory();
        let snapshot = tally_core::extract(&*plugin);
        assert_eq!(snapshot["level"], serde_json::json!(9));
    }
}
