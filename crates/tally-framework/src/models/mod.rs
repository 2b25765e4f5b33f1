//! Running-instance models: identifiers, lifecycle state, wrapper
//! configurations, filters and the running plugin types.

mod config;
mod filter;
mod id;
mod running;
mod state;

pub use config::{AggregatorConfig, InputConfig, OutputConfig, ProcessorConfig};
pub use filter::Filter;
pub use id::{InvalidPluginId, PluginId};
pub use running::{ProcessorUnit, RunningAggregator, RunningInput, RunningOutput, RunningProcessor};
pub use state::{PluginState, StateCell};
