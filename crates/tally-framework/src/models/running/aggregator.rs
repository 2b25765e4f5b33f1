use std::time::SystemTime;

use parking_lot::Mutex;
use tally_core::{FieldMap, extract};

use super::{Lifecycle, lifecycle_accessors, merge_snapshots};
use crate::error::PluginResult;
use crate::metric::{Accumulator, Metric};
use crate::models::config::AggregatorConfig;
use crate::models::id::PluginId;
use crate::plugin::{Aggregator, Category};

#[derive(Debug, Clone, Copy)]
struct Window {
    start: SystemTime,
    end: SystemTime,
}

/// An aggregator plugin tracked by the agent.
///
/// Aggregators observe metrics inside a period window. A metric is accepted
/// when its timestamp lies within `[start - grace, end + delay]`.
pub struct RunningAggregator {
    lifecycle: Lifecycle,
    config: AggregatorConfig,
    plugin: Mutex<Box<dyn Aggregator>>,
    window: Mutex<Window>,
}

impl RunningAggregator {
    pub fn new(plugin: Box<dyn Aggregator>, config: AggregatorConfig, id: PluginId) -> Self {
        let now = SystemTime::now();
        let period = config.period.to_std().unwrap_or_default();
        Self {
            lifecycle: Lifecycle::new(id, Category::Aggregators, &config.name, &config.alias),
            config,
            plugin: Mutex::new(plugin),
            window: Mutex::new(Window {
                start: now,
                end: now + period,
            }),
        }
    }

    lifecycle_accessors!();

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn period(&self) -> std::time::Duration {
        self.config.period.to_std().unwrap_or_default()
    }

    pub fn delay(&self) -> std::time::Duration {
        self.config.delay.to_std().unwrap_or_default()
    }

    /// Compiles the filter and initialises the plugin.
    pub fn init(&mut self) -> PluginResult<()> {
        self.config.filter.compile()?;
        self.plugin.get_mut().init()
    }

    /// Starts a new period window at `start`.
    pub fn update_window(&self, start: SystemTime) {
        *self.window.lock() = Window {
            start,
            end: start + self.period(),
        };
    }

    /// Offers a metric to the aggregator. Returns `true` when the original
    /// metric should be dropped from the pipeline.
    pub fn add(&self, metric: &Metric) -> bool {
        if !self.config.filter.select(metric) {
            return false;
        }
        let mut metric = metric.clone();
        self.config.filter.modify(&mut metric);
        if metric.fields().is_empty() {
            return false;
        }

        let window = *self.window.lock();
        let grace = self.config.grace.to_std().unwrap_or_default();
        let earliest = window.start.checked_sub(grace).unwrap_or(SystemTime::UNIX_EPOCH);
        let latest = window.end + self.delay();
        if metric.time() < earliest || metric.time() > latest {
            return false;
        }

        self.plugin.lock().add(&metric);
        self.config.drop_original
    }

    /// Emits the aggregates of the current period and resets the plugin.
    pub fn push(&self) -> Vec<Metric> {
        let mut acc = Accumulator::new();
        {
            let mut plugin = self.plugin.lock();
            plugin.push(&mut acc);
            plugin.reset();
        }
        acc.into_metrics()
            .into_iter()
            .map(|metric| self.make_metric(metric))
            .collect()
    }

    fn make_metric(&self, mut metric: Metric) -> Metric {
        let config = &self.config;
        if !config.name_override.is_empty() {
            metric.set_name(config.name_override.clone());
        }
        if !config.measurement_prefix.is_empty() || !config.measurement_suffix.is_empty() {
            let name = format!(
                "{}{}{}",
                config.measurement_prefix,
                metric.name(),
                config.measurement_suffix
            );
            metric.set_name(name);
        }
        for (key, value) in &config.tags {
            metric.tags_mut().insert(key.clone(), value.clone());
        }
        metric
    }

    /// Current wrapper and plugin field values.
    pub fn snapshot(&self) -> FieldMap {
        let plugin = self.plugin.lock();
        merge_snapshots(extract(&self.config), extract(&**plugin))
    }
}
