//! # Tally Standard Plugins
//!
//! Built-in plugins for the Tally telemetry agent. Every type here is
//! registered at link time with `#[register_plugin(...)]`:
//!
//! | Type | Plugin |
//! |------|--------|
//! | `inputs.cpu` | [`inputs::Cpu`] |
//! | `inputs.file` | [`inputs::File`] |
//! | `processors.rename` | [`processors::Rename`] |
//! | `aggregators.minmax` | [`aggregators::MinMax`] |
//! | `outputs.file` | [`outputs::File`] |
//! | `outputs.discard` | [`outputs::Discard`] |
//!
//! A binary must reference this crate for the linker to keep the
//! registrations; [`registry`] does both.
//!
//! ```rust,ignore
//! let runtime = TallyRuntime::builder()
//!     .registry(tally_plugins_std::registry())
//!     .build()?;
//! ```

pub mod aggregators;
pub mod inputs;
pub mod outputs;
pub mod processors;

use tally_framework::PluginRegistry;

/// Every plugin type linked into the binary, including these.
pub fn registry() -> PluginRegistry {
    PluginRegistry::linked()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;
    use tally_core::{Duration, FieldMap};
    use tally_framework::{Category, PluginState};
    use tally_runtime::{Agent, AgentSettings, ConfigApi, ErrorKind, PluginConfigRequest};
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn fields(value: serde_json::Value) -> FieldMap {
        value.as_object().cloned().unwrap_or_default()
    }

    fn api() -> (ConfigApi, Agent) {
        let agent = Agent::new(AgentSettings::default());
        let api = ConfigApi::new(Arc::new(registry()), Arc::new(agent.clone()));
        (api, agent)
    }

    #[test]
    fn every_builtin_is_linked() {
        let registry = registry();
        assert!(registry.names(Category::Inputs).contains(&"cpu"));
        assert!(registry.names(Category::Inputs).contains(&"file"));
        assert!(registry.names(Category::Processors).contains(&"rename"));
        assert!(registry.names(Category::Aggregators).contains(&"minmax"));
        assert!(registry.names(Category::Outputs).contains(&"file"));
        assert!(registry.names(Category::Outputs).contains(&"discard"));
    }

    #[test]
    fn every_builtin_derives_a_schema() {
        let (api, _agent) = api();
        let types = assert_ok!(api.list_types());
        let names: Vec<_> = types.iter().map(|t| t.qualified_name.as_str()).collect();
        for expected in ["inputs.cpu", "processors.rename", "outputs.file"] {
            assert!(names.contains(&expected), "missing {expected}");
        }

        let cpu = types.iter().find(|t| t.qualified_name == "inputs.cpu");
        let percpu = cpu.and_then(|t| t.fields.get("percpu"));
        assert_eq!(percpu.and_then(|f| f.default.clone()), Some(json!(true)));
    }

    #[tokio::test]
    async fn cpu_input_end_to_end() {
        let (api, agent) = api();
        let removed = Arc::new(Mutex::new(Vec::new()));
        {
            let removed = Arc::clone(&removed);
            api.hooks()
                .on_plugin_removed(move |event| removed.lock().unwrap().push(event.id.clone()));
        }

        let request = PluginConfigRequest::new("inputs.cpu", fields(json!({"percpu": true})));
        let id = assert_ok!(api.create(&request)).to_string();
        assert_eq!(id.len(), 16);

        let running = api.list_running().await;
        let entry = running.iter().find(|d| d.id.to_string() == id).unwrap();
        assert_eq!(entry.display_name, "inputs.cpu");
        assert_eq!(entry.snapshot["percpu"], json!(true));
        assert_eq!(api.status(&id), PluginState::Running);

        assert_ok!(api.delete(&id));
        assert_eq!(*removed.lock().unwrap(), vec![id.clone()]);
        assert_ne!(api.status(&id), PluginState::Running);

        agent.shutdown().await;
    }

    #[tokio::test]
    async fn durations_bind_from_text() {
        let (api, agent) = api();

        let request = PluginConfigRequest::new(
            "inputs.cpu",
            fields(json!({"interval": "1h30m", "collect_cpu_time": true})),
        );
        let id = assert_ok!(api.create(&request));
        let running = api.list_running().await;
        let entry = running.iter().find(|d| d.id == id).unwrap();
        assert_eq!(
            entry.snapshot["interval"],
            json!(Duration::from_secs(90 * 60).to_string())
        );

        let bad = PluginConfigRequest::new("inputs.cpu", fields(json!({"interval": "not-a-duration"})));
        let err = assert_err!(api.create(&bad));
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        agent.shutdown().await;
    }

    #[tokio::test]
    async fn pipeline_of_builtins() {
        let (api, agent) = api();
        let dir = assert_ok!(tempfile::tempdir());
        let out = dir.path().join("out.lp");

        let requests = [
            PluginConfigRequest::new(
                "processors.rename",
                fields(json!({"replace": [{"measurement": "cpu", "dest": "processor"}]})),
            ),
            PluginConfigRequest::new("aggregators.minmax", fields(json!({"period": "10s"}))),
            PluginConfigRequest::new(
                "outputs.file",
                fields(json!({"files": [out.display().to_string()], "data_format": "json"})),
            ),
            PluginConfigRequest::new("outputs.discard", FieldMap::new()),
        ];
        for request in &requests {
            assert_ok!(api.create(request));
        }

        let running = api.list_running().await;
        let names: Vec<_> = running.iter().map(|d| d.display_name.as_str()).collect();
        assert_eq!(
            names,
            ["processors.rename", "aggregators.minmax", "outputs.file", "outputs.discard"]
        );

        agent.shutdown().await;
    }
}
