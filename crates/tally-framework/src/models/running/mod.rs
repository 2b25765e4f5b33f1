//! Running plugin instances.
//!
//! A running instance pairs a plugin object with its wrapper configuration
//! and the bookkeeping the agent needs to drive it: an ID, an atomic
//! [`PluginState`] and a cancellation token used to request a stop.

mod aggregator;
mod input;
mod output;
mod processor;

use tally_core::FieldMap;
use tokio_util::sync::CancellationToken;

use super::id::PluginId;
use super::state::{PluginState, StateCell};
use crate::plugin::Category;

pub use aggregator::RunningAggregator;
pub use input::RunningInput;
pub use output::RunningOutput;
pub use processor::{ProcessorUnit, RunningProcessor};

/// Identity and lifecycle shared by every running instance.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    id: PluginId,
    category: Category,
    name: String,
    alias: String,
    state: StateCell,
    cancel: CancellationToken,
}

impl Lifecycle {
    pub(crate) fn new(id: PluginId, category: Category, name: &str, alias: &str) -> Self {
        Self {
            id,
            category,
            name: name.to_string(),
            alias: alias.to_string(),
            state: StateCell::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn id(&self) -> PluginId {
        self.id
    }

    pub(crate) fn type_name(&self) -> String {
        self.category.qualify(&self.name)
    }

    /// `category.name`, suffixed with `::alias` when one is set.
    pub(crate) fn log_name(&self) -> String {
        if self.alias.is_empty() {
            self.type_name()
        } else {
            format!("{}::{}", self.type_name(), self.alias)
        }
    }

    pub(crate) fn state(&self) -> PluginState {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: PluginState) {
        self.state.set(state);
    }

    /// Marks the instance as stopping and cancels its token.
    pub(crate) fn request_stop(&self) {
        if !self.state.transition(PluginState::Running, PluginState::Stopping) {
            self.state
                .transition(PluginState::Created, PluginState::Stopping);
        }
        self.cancel.cancel();
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Generates the lifecycle accessors every running type exposes.
macro_rules! lifecycle_accessors {
    () => {
        /// Instance identifier.
        pub fn id(&self) -> $crate::models::PluginId {
            self.lifecycle.id()
        }

        /// Qualified type name, e.g. `inputs.cpu`.
        pub fn type_name(&self) -> String {
            self.lifecycle.type_name()
        }

        /// Human-readable name used in logs and listings.
        pub fn log_name(&self) -> String {
            self.lifecycle.log_name()
        }

        pub fn state(&self) -> $crate::models::PluginState {
            self.lifecycle.state()
        }

        pub fn set_state(&self, state: $crate::models::PluginState) {
            self.lifecycle.set_state(state);
        }

        /// Requests an asynchronous stop; the running task observes the
        /// token and moves the instance to `Dead` when it ends.
        pub fn request_stop(&self) {
            self.lifecycle.request_stop();
        }

        pub fn cancellation(&self) -> &tokio_util::sync::CancellationToken {
            self.lifecycle.cancellation()
        }
    };
}

pub(crate) use lifecycle_accessors;

/// Merges the wrapper and plugin snapshots; plugin fields win on conflict.
pub(crate) fn merge_snapshots(wrapper: FieldMap, plugin: FieldMap) -> FieldMap {
    let mut merged = wrapper;
    merged.extend(plugin);
    merged
}
