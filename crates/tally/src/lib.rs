//! # Tally
//!
//! A telemetry agent whose plugins can be listed, created, reconfigured and
//! removed while it runs.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  create/update/delete  ┌───────────┐  add/run/stop  ┌─────────┐
//! │ API transport│───────────────────────▶│ ConfigApi │───────────────▶│  Agent  │
//! │  (yours)     │◀───── hooks ───────────│           │                │         │
//! └──────────────┘                        └───────────┘                └─────────┘
//!                                               │ bind / derive_schema / extract
//!                                               ▼
//!                                       plugin configuration types
//! ```
//!
//! - **Core**: binds untyped field sets onto typed configuration, derives
//!   schemas and takes snapshots
//! - **Framework**: plugin traits, the plugin type registry and running
//!   instances
//! - **Runtime**: the agent, the management API, configuration and logging
//! - **Standard plugins**: `cpu`, `file`, `rename`, `minmax`, `discard`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tally::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = TallyRuntime::builder().build()?;
//!     let fields = serde_json::json!({"percpu": false});
//!     runtime.api().create(&PluginConfigRequest::new(
//!         "inputs.cpu",
//!         fields.as_object().cloned().unwrap_or_default(),
//!     ))?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `std-plugins`: link the standard plugins (default)
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use tally_core as core;
pub use tally_framework as framework;
#[cfg(feature = "std-plugins")]
pub use tally_plugins_std as plugins;
pub use tally_runtime as runtime;

/// Plugin types linked into the binary.
pub fn registry() -> tally_framework::PluginRegistry {
    #[cfg(feature = "std-plugins")]
    {
        tally_plugins_std::registry()
    }
    #[cfg(not(feature = "std-plugins"))]
    {
        tally_framework::PluginRegistry::linked()
    }
}

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use tally::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use tally_runtime::{TallyConfig, TallyRuntime};

    // Management API
    pub use tally_runtime::{
        ApiError, ConfigApi, ErrorKind, PluginConfigRequest, PluginEvent, PluginTypeSchema,
        RunningPluginDescriptor,
    };

    // Plugin system - for writing plugins
    pub use tally_framework::prelude::*;
    pub use tally_framework::{Category, PluginId, PluginRegistry, PluginState};

    // Configuration engine
    pub use tally_core::{FieldMap, FieldSchema, FieldType, bind, derive_schema, extract};
}
