//! Listeners notified when instances are added or removed.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::types::PluginEvent;

/// A hook callback. Runs synchronously on the triggering task, so it should
/// return quickly.
pub type PluginCallback = Arc<dyn Fn(&PluginEvent) + Send + Sync>;

/// Add and remove hook lists.
///
/// Callbacks run in registration order. A callback may register further
/// callbacks; they take effect from the next event.
#[derive(Default)]
pub struct HookRegistry {
    added: RwLock<Vec<PluginCallback>>,
    removed: RwLock<Vec<PluginCallback>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback fired after an instance is created.
    pub fn on_plugin_added<F>(&self, callback: F)
    where
        F: Fn(&PluginEvent) + Send + Sync + 'static,
    {
        self.added.write().push(Arc::new(callback));
    }

    /// Registers a callback fired when an instance is deleted.
    pub fn on_plugin_removed<F>(&self, callback: F)
    where
        F: Fn(&PluginEvent) + Send + Sync + 'static,
    {
        self.removed.write().push(Arc::new(callback));
    }

    pub(crate) fn fire_added(&self, event: &PluginEvent) {
        fire(&self.added, "added", event);
    }

    pub(crate) fn fire_removed(&self, event: &PluginEvent) {
        fire(&self.removed, "removed", event);
    }
}

fn fire(hooks: &RwLock<Vec<PluginCallback>>, kind: &'static str, event: &PluginEvent) {
    let callbacks = hooks.read().clone();
    if callbacks.is_empty() {
        return;
    }
    debug!(
        hook = kind,
        id = %event.id,
        callbacks = callbacks.len(),
        "Firing plugin hooks"
    );
    for callback in &callbacks {
        callback(event);
    }
}
