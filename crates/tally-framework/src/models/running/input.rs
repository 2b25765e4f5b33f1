use std::collections::BTreeMap;

use parking_lot::RwLock;
use tally_core::{Duration, FieldMap, extract};
use tokio::sync::Mutex;

use super::{Lifecycle, lifecycle_accessors, merge_snapshots};
use crate::error::PluginResult;
use crate::metric::{Accumulator, Metric};
use crate::models::config::InputConfig;
use crate::models::id::PluginId;
use crate::plugin::{Category, Input};

/// An input plugin tracked by the agent.
pub struct RunningInput {
    lifecycle: Lifecycle,
    config: InputConfig,
    plugin: Mutex<Box<dyn Input>>,
    default_tags: RwLock<BTreeMap<String, String>>,
    idle_snapshot: RwLock<FieldMap>,
}

impl RunningInput {
    pub fn new(plugin: Box<dyn Input>, config: InputConfig, id: PluginId) -> Self {
        let idle_snapshot = RwLock::new(extract(&*plugin));
        Self {
            lifecycle: Lifecycle::new(id, Category::Inputs, &config.name, &config.alias),
            config,
            plugin: Mutex::new(plugin),
            default_tags: RwLock::new(BTreeMap::new()),
            idle_snapshot,
        }
    }

    lifecycle_accessors!();

    pub fn config(&self) -> &InputConfig {
        &self.config
    }

    /// Tags added to every gathered metric that does not carry them already.
    pub fn set_default_tags(&self, tags: BTreeMap<String, String>) {
        *self.default_tags.write() = tags;
    }

    /// Gather interval, falling back to `agent_interval` when unset.
    pub fn interval(&self, agent_interval: Duration) -> Duration {
        if self.config.interval.is_zero() {
            agent_interval
        } else {
            self.config.interval
        }
    }

    /// Compiles the filter and initialises the plugin.
    pub fn init(&mut self) -> PluginResult<()> {
        self.config.filter.compile()?;
        let plugin = self.plugin.get_mut();
        let result = plugin.init();
        *self.idle_snapshot.get_mut() = extract(&**plugin);
        result
    }

    /// Runs one gather round and applies the wrapper's metric rules.
    pub async fn gather(&self) -> PluginResult<Vec<Metric>> {
        let mut acc = Accumulator::new();
        {
            let mut plugin = self.plugin.lock().await;
            let result = plugin.gather(&mut acc).await;
            *self.idle_snapshot.write() = extract(&**plugin);
            result?;
        }

        let default_tags = self.default_tags.read().clone();
        Ok(acc
            .into_metrics()
            .into_iter()
            .filter_map(|metric| self.make_metric(metric, &default_tags))
            .collect())
    }

    fn make_metric(&self, metric: Metric, default_tags: &BTreeMap<String, String>) -> Option<Metric> {
        let mut metric = self.config.filter.apply(metric)?;
        let config = &self.config;

        if !config.name_override.is_empty() {
            metric.set_name(config.name_override.clone());
        }
        if !config.measurement_prefix.is_empty() || !config.measurement_suffix.is_empty() {
            let name = format!(
                "{}{}{}",
                config.measurement_prefix,
                metric.name(),
                config.measurement_suffix
            );
            metric.set_name(name);
        }
        for (key, value) in &config.tags {
            metric.tags_mut().insert(key.clone(), value.clone());
        }
        for (key, value) in default_tags {
            metric.add_tag_if_absent(key, value);
        }
        Some(metric)
    }

    /// Current wrapper and plugin field values.
    ///
    /// Never waits on a gather in progress: while the plugin is busy its
    /// fields come from the copy taken when it was last idle.
    pub async fn snapshot(&self) -> FieldMap {
        let plugin = match self.plugin.try_lock() {
            Ok(plugin) => {
                let fields = extract(&**plugin);
                *self.idle_snapshot.write() = fields.clone();
                fields
            }
            Err(_) => self.idle_snapshot.read().clone(),
        };
        merge_snapshots(extract(&self.config), plugin)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;
    use tally_core::{Configurable, bind};

    use super::*;
    use crate::metric::FieldValue;
    use crate::models::PluginState;

    #[derive(Default, Configurable)]
    struct Counter {
        pub start: i64,
    }

    #[async_trait]
    impl Input for Counter {
        async fn gather(&mut self, acc: &mut Accumulator) -> PluginResult<()> {
            self.start += 1;
            acc.add_fields(
                "counter",
                [("value", self.start), ("spare", 0)],
                BTreeMap::from([("host".to_string(), "plugin".to_string())]),
            );
            Ok(())
        }
    }

    fn running(fields: serde_json::Value) -> RunningInput {
        let fields = fields.as_object().cloned().unwrap();
        let mut plugin: Box<dyn Input> = Box::new(Counter::default());
        bind(&mut *plugin, &fields).unwrap();
        let mut config = InputConfig::new("counter");
        bind(&mut config, &fields).unwrap();
        let mut input = RunningInput::new(plugin, config, PluginId::new(0xab));
        input.init().unwrap();
        input
    }

    #[tokio::test]
    async fn applies_wrapper_rules() {
        let input = running(json!({
            "start": 41,
            "measurement_prefix": "my_",
            "tags": {"dc": "east"},
            "fielddrop": ["spare"],
        }));
        input.set_default_tags(BTreeMap::from([
            ("host".to_string(), "agent".to_string()),
            ("region".to_string(), "eu".to_string()),
        ]));

        let metrics = input.gather().await.unwrap();
        assert_eq!(metrics.len(), 1);
        let metric = &metrics[0];
        assert_eq!(metric.name(), "my_counter");
        assert_eq!(metric.fields()["value"], FieldValue::Integer(42));
        assert!(!metric.fields().contains_key("spare"));
        assert_eq!(metric.tags()["host"], "plugin");
        assert_eq!(metric.tags()["dc"], "east");
        assert_eq!(metric.tags()["region"], "eu");
    }

    #[tokio::test]
    async fn snapshot_merges_wrapper_and_plugin() {
        let input = running(json!({"start": 3, "alias": "main", "interval": "5s"}));
        assert_eq!(input.log_name(), "inputs.counter::main");
        assert_eq!(input.state(), PluginState::Created);
        assert_eq!(input.interval(Duration::from_secs(10)), Duration::from_secs(5));

        let snapshot = input.snapshot().await;
        assert_eq!(snapshot["start"], json!(3));
        assert_eq!(snapshot["alias"], json!("main"));
        assert_eq!(snapshot["interval"], json!("5s"));
    }

    #[derive(Default, Configurable)]
    struct Stalled {
        pub label: String,
        #[config(skip)]
        pub release: Arc<Notify>,
    }

    #[async_trait]
    impl Input for Stalled {
        async fn gather(&mut self, _acc: &mut Accumulator) -> PluginResult<()> {
            self.release.notified().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn snapshot_does_not_wait_for_gather() {
        let release = Arc::new(Notify::new());
        let plugin = Stalled {
            label: "slow".to_string(),
            release: Arc::clone(&release),
        };
        let config = InputConfig::new("stalled");
        let mut input = RunningInput::new(Box::new(plugin), config, PluginId::new(2));
        input.init().unwrap();
        let input = Arc::new(input);

        let gathering = tokio::spawn({
            let input = Arc::clone(&input);
            async move { input.gather().await }
        });
        while input.plugin.try_lock().is_ok() {
            tokio::task::yield_now().await;
        }

        let timeout = std::time::Duration::from_secs(1);
        let snapshot = tokio::time::timeout(timeout, input.snapshot()).await;
        assert_eq!(snapshot.unwrap()["label"], json!("slow"));

        release.notify_one();
        assert!(gathering.await.unwrap().is_ok());
    }

    #[test]
    fn invalid_filter_fails_init() {
        let mut config = InputConfig::new("counter");
        config.filter.namepass = vec!["[".to_string()];
        let mut input = RunningInput::new(Box::new(Counter::default()), config, PluginId::new(1));
        assert!(input.init().is_err());
    }
}
