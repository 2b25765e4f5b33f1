use std::sync::Arc;

use parking_lot::Mutex;
use tally_core::{FieldMap, extract};
use tokio_util::sync::CancellationToken;

use super::aggregator::RunningAggregator;
use super::{Lifecycle, lifecycle_accessors, merge_snapshots};
use crate::error::PluginResult;
use crate::metric::Metric;
use crate::models::config::ProcessorConfig;
use crate::models::id::PluginId;
use crate::models::state::PluginState;
use crate::plugin::{Category, Processor};

/// A processor plugin tracked by the agent.
pub struct RunningProcessor {
    lifecycle: Lifecycle,
    config: ProcessorConfig,
    plugin: Mutex<Box<dyn Processor>>,
}

impl RunningProcessor {
    pub fn new(plugin: Box<dyn Processor>, config: ProcessorConfig, id: PluginId) -> Self {
        Self {
            lifecycle: Lifecycle::new(id, Category::Processors, &config.name, &config.alias),
            config,
            plugin: Mutex::new(plugin),
        }
    }

    lifecycle_accessors!();

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Compiles the filter and initialises the plugin.
    pub fn init(&mut self) -> PluginResult<()> {
        self.config.filter.compile()?;
        self.plugin.get_mut().init()
    }

    /// Runs the metrics the filter selects through the plugin; the rest
    /// pass through unchanged after them.
    pub fn apply(&self, metrics: Vec<Metric>) -> Vec<Metric> {
        let (mut selected, passed): (Vec<Metric>, Vec<Metric>) = metrics
            .into_iter()
            .partition(|metric| self.config.filter.select(metric));
        if selected.is_empty() {
            return passed;
        }
        for metric in &mut selected {
            self.config.filter.modify(metric);
        }

        let mut out = self.plugin.lock().apply(selected);
        out.extend(passed);
        out
    }

    /// Current wrapper and plugin field values.
    pub fn snapshot(&self) -> FieldMap {
        let plugin = self.plugin.lock();
        merge_snapshots(extract(&self.config), extract(&**plugin))
    }
}

/// An entry of the agent's processor list: processors and aggregators are
/// tracked together.
#[derive(Clone)]
pub enum ProcessorUnit {
    Processor(Arc<RunningProcessor>),
    Aggregator(Arc<RunningAggregator>),
}

impl ProcessorUnit {
    pub fn id(&self) -> PluginId {
        match self {
            ProcessorUnit::Processor(p) => p.id(),
            ProcessorUnit::Aggregator(a) => a.id(),
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            ProcessorUnit::Processor(p) => p.type_name(),
            ProcessorUnit::Aggregator(a) => a.type_name(),
        }
    }

    pub fn log_name(&self) -> String {
        match self {
            ProcessorUnit::Processor(p) => p.log_name(),
            ProcessorUnit::Aggregator(a) => a.log_name(),
        }
    }

    pub fn state(&self) -> PluginState {
        match self {
            ProcessorUnit::Processor(p) => p.state(),
            ProcessorUnit::Aggregator(a) => a.state(),
        }
    }

    pub fn set_state(&self, state: PluginState) {
        match self {
            ProcessorUnit::Processor(p) => p.set_state(state),
            ProcessorUnit::Aggregator(a) => a.set_state(state),
        }
    }

    pub fn request_stop(&self) {
        match self {
            ProcessorUnit::Processor(p) => p.request_stop(),
            ProcessorUnit::Aggregator(a) => a.request_stop(),
        }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        match self {
            ProcessorUnit::Processor(p) => p.cancellation(),
            ProcessorUnit::Aggregator(a) => a.cancellation(),
        }
    }

    /// Position in the processing chain; aggregators run after processors.
    pub fn order(&self) -> i64 {
        match self {
            ProcessorUnit::Processor(p) => p.config().order,
            ProcessorUnit::Aggregator(_) => i64::MAX,
        }
    }

    pub fn snapshot(&self) -> FieldMap {
        match self {
            ProcessorUnit::Processor(p) => p.snapshot(),
            ProcessorUnit::Aggregator(a) => a.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::SystemTime;

    use tally_core::Configurable;

    use super::*;
    use crate::metric::FieldValue;

    #[derive(Default, Configurable)]
    struct Upper {
        pub suffix: String,
    }

    impl Processor for Upper {
        fn apply(&mut self, metrics: Vec<Metric>) -> Vec<Metric> {
            metrics
                .into_iter()
                .map(|mut metric| {
                    let name = format!("{}{}", metric.name().to_uppercase(), self.suffix);
                    metric.set_name(name);
                    metric
                })
                .collect()
        }
    }

    fn metric(name: &str) -> Metric {
        Metric::new(
            name,
            BTreeMap::new(),
            BTreeMap::from([("v".to_string(), FieldValue::Integer(1))]),
            SystemTime::now(),
        )
    }

    #[test]
    fn only_selected_metrics_are_processed() {
        let mut config = ProcessorConfig::new("upper");
        config.filter.namepass = vec!["cpu".to_string()];
        config.order = 3;
        let mut processor = RunningProcessor::new(
            Box::new(Upper {
                suffix: "!".to_string(),
            }),
            config,
            PluginId::new(5),
        );
        processor.init().unwrap();

        let out = processor.apply(vec![metric("cpu"), metric("mem")]);
        let names: Vec<&str> = out.iter().map(Metric::name).collect();
        assert_eq!(names, vec!["CPU!", "mem"]);

        let unit = ProcessorUnit::Processor(Arc::new(processor));
        assert_eq!(unit.order(), 3);
        assert_eq!(unit.type_name(), "processors.upper");
        assert_eq!(unit.snapshot()["suffix"], "!");
        assert_eq!(unit.snapshot()["order"], 3);
    }
}
