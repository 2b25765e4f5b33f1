use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Lifecycle state of a running plugin instance.
///
/// ```text
/// create ──► Created ──run──► Running ──stop──► Stopping ──task ends──► Dead
/// ```
///
/// An instance the agent no longer tracks reports [`PluginState::Dead`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    Created,
    Running,
    Stopping,
    Dead,
}

impl PluginState {
    pub fn as_str(self) -> &'static str {
        match self {
            PluginState::Created => "created",
            PluginState::Running => "running",
            PluginState::Stopping => "stopping",
            PluginState::Dead => "dead",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => PluginState::Created,
            1 => PluginState::Running,
            2 => PluginState::Stopping,
            _ => PluginState::Dead,
        }
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic cell holding a [`PluginState`].
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: PluginState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> PluginState {
        PluginState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: PluginState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves to `next` only when the current state is `expected`.
    pub fn transition(&self, expected: PluginState, next: PluginState) -> bool {
        self.0
            .compare_exchange(
                expected as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new(PluginState::Created)
    }
}
