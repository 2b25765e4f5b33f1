//! In-process agent running plugin instances on tokio tasks.
//!
//! Every instance runs on its own task:
//!
//! - inputs gather on their interval, pass the metrics through the processor
//!   chain and publish them on the agent's metric bus;
//! - outputs subscribe to the bus, buffer and write in batches, and flush
//!   on their flush interval and when stopped;
//! - aggregators push their aggregates onto the bus once per period;
//! - processors are applied inline by the inputs and only hold their state.
//!
//! A task removes its instance from the agent's lists and marks it
//! [`PluginState::Dead`] when its cancellation token fires.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use tally_core::Duration;
use tally_framework::{
    AgentController, Metric, PluginState, ProcessorUnit, RunningAggregator, RunningInput,
    RunningOutput, RunningProcessor,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::TallyConfig;

const MIN_PERIOD: std::time::Duration = std::time::Duration::from_millis(1);

/// Capacity of the metric bus per subscriber before it lags.
const BUS_CAPACITY: usize = 10_000;

fn period(duration: Duration) -> std::time::Duration {
    duration.to_std().unwrap_or_default().max(MIN_PERIOD)
}

/// Agent-wide settings.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub interval: Duration,
    pub flush_interval: Duration,
    pub metric_batch_size: usize,
    pub metric_buffer_limit: usize,
    /// Tags given to every new input.
    pub default_tags: BTreeMap<String, String>,
}

impl AgentSettings {
    /// Reads the `agent` section; global tags gain a `host` tag unless
    /// `omit_hostname` is set.
    pub fn from_config(config: &TallyConfig) -> Self {
        let mut default_tags = config.global_tags.clone();
        if !config.agent.omit_hostname {
            default_tags
                .entry("host".to_string())
                .or_insert_with(|| config.agent.resolved_hostname());
        }
        Self {
            interval: config.agent.interval,
            flush_interval: config.agent.flush_interval,
            metric_batch_size: config.agent.metric_batch_size,
            metric_buffer_limit: config.agent.metric_buffer_limit,
            default_tags,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&TallyConfig::default())
    }
}

/// The running-instance model of the agent.
///
/// Cheap to clone; clones share the same instances.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    settings: AgentSettings,
    inputs: RwLock<Vec<Arc<RunningInput>>>,
    processors: RwLock<Vec<ProcessorUnit>>,
    outputs: RwLock<Vec<Arc<RunningOutput>>>,
    bus: broadcast::Sender<Metric>,
    tasks: TaskTracker,
}

impl Agent {
    pub fn new(settings: AgentSettings) -> Self {
        let capacity = settings.metric_buffer_limit.clamp(1, BUS_CAPACITY);
        let (bus, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(AgentInner {
                settings,
                inputs: RwLock::new(Vec::new()),
                processors: RwLock::new(Vec::new()),
                outputs: RwLock::new(Vec::new()),
                bus,
                tasks: TaskTracker::new(),
            }),
        }
    }

    pub fn from_config(config: &TallyConfig) -> Self {
        Self::new(AgentSettings::from_config(config))
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.inner.settings
    }

    /// Number of instance tasks still running.
    pub fn task_count(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Stops every instance and waits for their tasks to finish.
    pub async fn shutdown(&self) {
        info!("Stopping all plugins");
        for input in self.running_inputs() {
            self.stop_input(&input);
        }
        for unit in self.running_processors() {
            self.stop_processor(&unit);
        }
        for output in self.running_outputs() {
            self.stop_output(&output);
        }
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
        info!("All plugins stopped");
    }
}

impl AgentInner {
    /// Runs metrics through the processor chain and publishes the result.
    fn dispatch(&self, mut metrics: Vec<Metric>) {
        let chain = self.processors.read().clone();
        for unit in &chain {
            if unit.state() != PluginState::Running {
                continue;
            }
            metrics = match unit {
                ProcessorUnit::Processor(processor) => processor.apply(metrics),
                ProcessorUnit::Aggregator(aggregator) => metrics
                    .into_iter()
                    .filter(|metric| !aggregator.add(metric))
                    .collect(),
            };
        }
        self.publish(metrics);
    }

    fn publish(&self, metrics: Vec<Metric>) {
        for metric in metrics {
            // Fails only when no output is subscribed.
            let _ = self.bus.send(metric);
        }
    }

    fn remove_input(&self, input: &Arc<RunningInput>) {
        self.inputs.write().retain(|i| !Arc::ptr_eq(i, input));
        input.set_state(PluginState::Dead);
    }

    fn remove_unit(&self, unit: &ProcessorUnit) {
        self.processors.write().retain(|u| !same_unit(u, unit));
        unit.set_state(PluginState::Dead);
    }

    fn remove_output(&self, output: &Arc<RunningOutput>) {
        self.outputs.write().retain(|o| !Arc::ptr_eq(o, output));
        output.set_state(PluginState::Dead);
    }
}

fn same_unit(a: &ProcessorUnit, b: &ProcessorUnit) -> bool {
    match (a, b) {
        (ProcessorUnit::Processor(a), ProcessorUnit::Processor(b)) => Arc::ptr_eq(a, b),
        (ProcessorUnit::Aggregator(a), ProcessorUnit::Aggregator(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

// ─── Instance tasks ─────────────────────────────────────────────────────────

async fn input_task(inner: Arc<AgentInner>, input: Arc<RunningInput>) {
    let cancel = input.cancellation().clone();
    let every = period(input.interval(inner.settings.interval));
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(plugin = %input.log_name(), id = %input.id(), interval = ?every, "Input started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => match input.gather().await {
                Ok(metrics) => inner.dispatch(metrics),
                Err(err) => warn!(plugin = %input.log_name(), error = %err, "Gather failed"),
            },
        }
    }

    inner.remove_input(&input);
    info!(plugin = %input.log_name(), id = %input.id(), "Input stopped");
}

async fn output_task(inner: Arc<AgentInner>, output: Arc<RunningOutput>) {
    let mut metrics = inner.bus.subscribe();
    let cancel = output.cancellation().clone();
    if let Err(err) = output.connect().await {
        error!(plugin = %output.log_name(), error = %err, "Failed to connect output");
    }

    let every = period(output.flush_interval(inner.settings.flush_interval));
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(plugin = %output.log_name(), id = %output.id(), flush_interval = ?every, "Output started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(err) = output.flush().await {
                    warn!(plugin = %output.log_name(), error = %err, "Flush failed");
                }
            }
            received = metrics.recv() => match received {
                Ok(metric) => {
                    if output.add_metric(metric)
                        && let Err(err) = output.write_batch().await
                    {
                        warn!(plugin = %output.log_name(), error = %err, "Write failed");
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(plugin = %output.log_name(), missed, "Output fell behind the metric bus");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    if let Err(err) = output.flush().await {
        warn!(
            plugin = %output.log_name(),
            error = %err,
            buffered = output.buffered(),
            "Final flush failed"
        );
    }
    if let Err(err) = output.close().await {
        warn!(plugin = %output.log_name(), error = %err, "Failed to close output");
    }
    inner.remove_output(&output);
    info!(plugin = %output.log_name(), id = %output.id(), "Output stopped");
}

async fn aggregator_task(inner: Arc<AgentInner>, aggregator: Arc<RunningAggregator>) {
    let cancel = aggregator.cancellation().clone();
    let every = aggregator.period().max(MIN_PERIOD);
    let delay = aggregator.delay();
    let mut ticker = tokio::time::interval_at(Instant::now() + every + delay, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(plugin = %aggregator.log_name(), id = %aggregator.id(), period = ?every, "Aggregator started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let aggregates = aggregator.push();
                debug!(plugin = %aggregator.log_name(), count = aggregates.len(), "Pushed aggregates");
                inner.publish(aggregates);
                let now = SystemTime::now();
                aggregator.update_window(now.checked_sub(delay).unwrap_or(now));
            }
        }
    }

    inner.remove_unit(&ProcessorUnit::Aggregator(Arc::clone(&aggregator)));
    info!(plugin = %aggregator.log_name(), id = %aggregator.id(), "Aggregator stopped");
}

async fn processor_task(inner: Arc<AgentInner>, processor: Arc<RunningProcessor>) {
    info!(plugin = %processor.log_name(), id = %processor.id(), "Processor started");
    processor.cancellation().cancelled().await;
    inner.remove_unit(&ProcessorUnit::Processor(Arc::clone(&processor)));
    info!(plugin = %processor.log_name(), id = %processor.id(), "Processor stopped");
}

// ─── AgentController ────────────────────────────────────────────────────────

impl AgentController for Agent {
    fn running_inputs(&self) -> Vec<Arc<RunningInput>> {
        self.inner.inputs.read().clone()
    }

    fn running_processors(&self) -> Vec<ProcessorUnit> {
        self.inner.processors.read().clone()
    }

    fn running_outputs(&self) -> Vec<Arc<RunningOutput>> {
        self.inner.outputs.read().clone()
    }

    fn add_input(&self, input: Arc<RunningInput>) {
        self.inner.inputs.write().push(input);
    }

    /// Keeps the chain sorted by order; equal orders keep insertion order.
    fn add_processor(&self, unit: ProcessorUnit) {
        let mut processors = self.inner.processors.write();
        processors.push(unit);
        processors.sort_by_key(ProcessorUnit::order);
    }

    fn add_output(&self, output: Arc<RunningOutput>) {
        self.inner.outputs.write().push(output);
    }

    fn run_input(&self, input: Arc<RunningInput>) {
        if input.state() != PluginState::Created {
            return;
        }
        input.set_state(PluginState::Running);
        self.inner
            .tasks
            .spawn(input_task(Arc::clone(&self.inner), input));
    }

    fn run_processor(&self, unit: ProcessorUnit) {
        if unit.state() != PluginState::Created {
            return;
        }
        unit.set_state(PluginState::Running);
        let inner = Arc::clone(&self.inner);
        match unit {
            ProcessorUnit::Processor(processor) => {
                self.inner.tasks.spawn(processor_task(inner, processor));
            }
            ProcessorUnit::Aggregator(aggregator) => {
                self.inner.tasks.spawn(aggregator_task(inner, aggregator));
            }
        }
    }

    fn run_output(&self, output: Arc<RunningOutput>) {
        if output.state() != PluginState::Created {
            return;
        }
        output.set_state(PluginState::Running);
        self.inner
            .tasks
            .spawn(output_task(Arc::clone(&self.inner), output));
    }

    fn stop_input(&self, input: &Arc<RunningInput>) {
        let never_ran = input.state() == PluginState::Created;
        input.request_stop();
        if never_ran {
            self.inner.remove_input(input);
        }
    }

    fn stop_processor(&self, unit: &ProcessorUnit) {
        let never_ran = unit.state() == PluginState::Created;
        unit.request_stop();
        if never_ran {
            self.inner.remove_unit(unit);
        }
    }

    fn stop_output(&self, output: &Arc<RunningOutput>) {
        let never_ran = output.state() == PluginState::Created;
        output.request_stop();
        if never_ran {
            self.inner.remove_output(output);
        }
    }

    fn default_tags(&self) -> BTreeMap<String, String> {
        self.inner.settings.default_tags.clone()
    }

    fn metric_batch_size(&self) -> usize {
        self.inner.settings.metric_batch_size
    }

    fn metric_buffer_limit(&self) -> usize {
        self.inner.settings.metric_buffer_limit
    }
}
