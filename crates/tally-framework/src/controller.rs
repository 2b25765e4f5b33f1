//! The agent's running-instance model, as seen by the management surface.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::models::{PluginId, PluginState, ProcessorUnit, RunningInput, RunningOutput};

/// Access to the instances an agent is running.
///
/// Implementations own the instance lists and provide their own
/// consistency; callers never hold the returned handles for longer than an
/// operation. `run_*` starts execution on an independently scheduled task
/// and `stop_*` only requests a stop: both return immediately.
pub trait AgentController: Send + Sync {
    fn running_inputs(&self) -> Vec<Arc<RunningInput>>;

    /// Processors and aggregators, in chain order.
    fn running_processors(&self) -> Vec<ProcessorUnit>;

    fn running_outputs(&self) -> Vec<Arc<RunningOutput>>;

    fn add_input(&self, input: Arc<RunningInput>);

    fn add_processor(&self, unit: ProcessorUnit);

    fn add_output(&self, output: Arc<RunningOutput>);

    fn run_input(&self, input: Arc<RunningInput>);

    fn run_processor(&self, unit: ProcessorUnit);

    fn run_output(&self, output: Arc<RunningOutput>);

    fn stop_input(&self, input: &Arc<RunningInput>);

    fn stop_processor(&self, unit: &ProcessorUnit);

    fn stop_output(&self, output: &Arc<RunningOutput>);

    /// Tags applied to metrics of newly created inputs.
    fn default_tags(&self) -> BTreeMap<String, String>;

    fn metric_batch_size(&self) -> usize;

    fn metric_buffer_limit(&self) -> usize;

    /// State of the tracked instance with `id`, `None` when untracked.
    fn instance_state(&self, id: PluginId) -> Option<PluginState> {
        if let Some(input) = self.running_inputs().iter().find(|i| i.id() == id) {
            return Some(input.state());
        }
        if let Some(unit) = self.running_processors().iter().find(|u| u.id() == id) {
            return Some(unit.state());
        }
        self.running_outputs()
            .iter()
            .find(|o| o.id() == id)
            .map(|output| output.state())
    }

    /// Whether any tracked instance uses `id`.
    fn is_tracked(&self, id: PluginId) -> bool {
        self.instance_state(id).is_some()
    }
}
