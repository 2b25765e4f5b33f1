//! Tally Runtime - the agent and its runtime management surface.
//!
//! This crate provides:
//! - A reference agent (`Agent`) that gathers, processes, aggregates and
//!   writes metrics on its own tasks
//! - The plugin management API (`ConfigApi`): list plugin types with their
//!   schemas, create, update, delete and inspect running instances
//! - Add/remove hooks for observers of the instance set
//! - Layered configuration and logging setup
//!
//! # Example
//!
//! ```ignore
//! use tally_runtime::{PluginConfigRequest, TallyRuntime};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = TallyRuntime::builder().build()?;
//!
//!     runtime.api().hooks().on_plugin_added(|event| {
//!         println!("added {}", event.id);
//!     });
//!
//!     let fields = serde_json::json!({"percpu": false});
//!     let request = PluginConfigRequest::new("inputs.cpu", fields.as_object().cloned().unwrap_or_default());
//!     let id = runtime.api().create(&request)?;
//!     println!("{id}: {:?}", runtime.api().status(&id.to_string()));
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Instance lifecycle
//!
//! Every created instance gets a random 64-bit ID, rendered as 16 lowercase
//! hex digits. Instances move through `created → running → stopping → dead`;
//! an ID the agent no longer tracks always reports `dead`.

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use agent::{Agent, AgentSettings};
pub use api::{
    ApiError, ApiResult, ConfigApi, ErrorKind, HookRegistry, PluginCallback, PluginConfigRequest,
    PluginEvent, PluginTypeSchema, RunningPluginDescriptor,
};
pub use config::{ConfigError, ConfigLoader, ConfigResult, TallyConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{RuntimeBuilder, TallyRuntime};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
