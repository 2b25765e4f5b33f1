//! Runtime plugin management.
//!
//! [`ConfigApi`] lists plugin types with their configuration schemas, lists
//! running instances with their current settings, and creates, updates and
//! deletes instances of a live agent. Listeners subscribe to instance
//! changes through the [`HookRegistry`].

mod error;
mod hooks;
mod manager;
mod types;

pub use error::{ApiError, ApiResult, ErrorKind};
pub use hooks::{HookRegistry, PluginCallback};
pub use manager::ConfigApi;
pub use types::{PluginConfigRequest, PluginEvent, PluginTypeSchema, RunningPluginDescriptor};
