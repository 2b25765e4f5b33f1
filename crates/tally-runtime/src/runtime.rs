//! Runtime bootstrap: configuration, logging, the agent and its
//! management API.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tally_runtime::TallyRuntime;
//!
//! let runtime = TallyRuntime::builder()
//!     .config_file("/etc/tally/tally.toml")
//!     .profile("production")
//!     .build()?;
//!
//! runtime.api().create(&PluginConfigRequest::new("inputs.cpu", FieldMap::new()))?;
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tally_framework::{PluginId, PluginRegistry};
use tokio::signal;
use tracing::info;

use crate::agent::Agent;
use crate::api::{ConfigApi, PluginConfigRequest};
use crate::config::{ConfigLoader, TallyConfig, validate_config};
use crate::error::RuntimeResult;
use crate::logging;

/// A configured agent together with its management API.
pub struct TallyRuntime {
    config: TallyConfig,
    agent: Agent,
    api: Arc<ConfigApi>,
}

impl TallyRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an already loaded configuration.
    ///
    /// Validates the configuration and initialises logging (a no-op when a
    /// subscriber is already installed).
    pub fn from_config(config: TallyConfig, registry: PluginRegistry) -> RuntimeResult<Self> {
        validate_config(&config)?;
        logging::init_from_config(&config.logging);

        let agent = Agent::from_config(&config);
        let api = Arc::new(ConfigApi::with_settings(
            Arc::new(registry),
            Arc::new(agent.clone()),
            &config.api,
        ));

        info!(
            plugin_types = api.registry().len(),
            interval = %config.agent.interval,
            log_level = %config.logging.level,
            "Runtime initialized"
        );
        Ok(Self { config, agent, api })
    }

    pub fn config(&self) -> &TallyConfig {
        &self.config
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// The management API; clone the `Arc` to hand it to a transport.
    pub fn api(&self) -> &Arc<ConfigApi> {
        &self.api
    }

    /// Creates each request in turn, stopping at the first failure.
    pub fn create_all(&self, requests: &[PluginConfigRequest]) -> RuntimeResult<Vec<PluginId>> {
        let mut ids = Vec::with_capacity(requests.len());
        for request in requests {
            ids.push(self.api.create(request)?);
        }
        Ok(ids)
    }

    /// Runs until Ctrl+C or SIGTERM, then stops every plugin.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!("Tally agent is running. Press Ctrl+C to stop.");
        wait_for_shutdown().await?;
        self.shutdown().await;
        Ok(())
    }

    /// Runs until `shutdown` completes, then stops every plugin.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        shutdown.await;
        self.shutdown().await;
    }

    /// Aborts pending updates and stops every plugin.
    pub async fn shutdown(&self) {
        self.api.shutdown();
        self.agent.shutdown().await;
        info!("Runtime stopped");
    }
}

/// Waits for Ctrl+C or, on Unix, SIGTERM.
async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`TallyRuntime`].
///
/// # Example
///
/// ```rust,ignore
/// let runtime = TallyRuntime::builder()
///     .config_file("config/tally.toml")
///     .registry(PluginRegistry::new().with_input("cpu", cpu))
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<TallyConfig>,
    registry: Option<PluginRegistry>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            config: None,
            registry: None,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Layers `config` under the files and environment.
    pub fn merge(mut self, config: TallyConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Uses `config` as is, skipping files and the environment.
    pub fn config(mut self, config: TallyConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replaces the plugins linked into the binary.
    pub fn registry(mut self, registry: PluginRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> RuntimeResult<TallyRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => self.config_loader.load()?,
        };
        let registry = self.registry.unwrap_or_else(PluginRegistry::linked);
        TallyRuntime::from_config(config, registry)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tally_framework::PluginState;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::error::RuntimeError;

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = TallyConfig::default();
        config.agent.metric_batch_size = 0;
        let result = TallyRuntime::builder()
            .config(config)
            .registry(PluginRegistry::new())
            .build();
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }

    #[tokio::test]
    async fn bootstrap_requests_fail_fast() {
        let runtime = assert_ok!(
            TallyRuntime::builder()
                .config(TallyConfig::default())
                .registry(PluginRegistry::new())
                .build()
        );
        assert!(assert_ok!(runtime.api().list_types()).is_empty());

        let requests = [PluginConfigRequest::new("inputs.cpu", Default::default())];
        let err = assert_err!(runtime.create_all(&requests));
        assert!(matches!(err, RuntimeError::Api(_)));
        assert_eq!(runtime.api().status("0000000000000001"), PluginState::Dead);

        runtime.run_until(async {}).await;
    }
}
