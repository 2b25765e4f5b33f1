//! The plugin lifecycle manager.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tally_core::{Configurable, Duration, FieldMap, FieldSchema, bind, derive_schema};
use tally_framework::format::{ParserConfig, SerializerConfig, new_parser, new_serializer};
use tally_framework::{
    AgentController, AggregatorConfig, Category, InputConfig, OutputConfig, PluginId,
    PluginRegistry, PluginState, ProcessorConfig, ProcessorUnit, RunningAggregator, RunningInput,
    RunningOutput, RunningProcessor,
};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use super::hooks::HookRegistry;
use super::types::{PluginConfigRequest, PluginEvent, PluginTypeSchema, RunningPluginDescriptor};
use crate::config::ApiConfig;

/// Creates, updates, deletes and inspects plugin instances of a running
/// agent.
///
/// ```rust,ignore
/// let api = ConfigApi::new(Arc::new(PluginRegistry::linked()), agent);
///
/// let id = api.create(&PluginConfigRequest::new(
///     "inputs.cpu",
///     serde_json::from_str(r#"{"percpu": true}"#)?,
/// ))?;
/// assert_eq!(api.status(&id.to_string()), PluginState::Running);
/// api.delete(&id.to_string())?;
/// ```
pub struct ConfigApi {
    registry: Arc<PluginRegistry>,
    agent: Arc<dyn AgentController>,
    hooks: HookRegistry,
    update_timeout: Duration,
    poll_interval: Duration,
    shutdown: CancellationToken,
}

impl ConfigApi {
    pub fn new(registry: Arc<PluginRegistry>, agent: Arc<dyn AgentController>) -> Self {
        Self::with_settings(registry, agent, &ApiConfig::default())
    }

    pub fn with_settings(
        registry: Arc<PluginRegistry>,
        agent: Arc<dyn AgentController>,
        settings: &ApiConfig,
    ) -> Self {
        Self {
            registry,
            agent,
            hooks: HookRegistry::new(),
            update_timeout: settings.update_timeout,
            poll_interval: settings.update_poll_interval,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Aborts pending updates; later updates fail with `Cancelled` while
    /// waiting.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    // ─── Catalogue ──────────────────────────────────────────────────────────

    /// Schemas of every registered plugin type, by category and then name.
    ///
    /// Fails as a whole when any type cannot be described.
    pub fn list_types(&self) -> ApiResult<Vec<PluginTypeSchema>> {
        let mut types = Vec::with_capacity(self.registry.len());
        for category in Category::ALL {
            for name in self.registry.names(category) {
                let qualified_name = category.qualify(name);
                let fields = self.describe(category, name).inspect_err(|err| {
                    error!(plugin = %qualified_name, error = %err, "Plugin type cannot be described");
                })?;
                types.push(PluginTypeSchema {
                    qualified_name,
                    fields,
                });
            }
        }
        Ok(types)
    }

    fn describe(&self, category: Category, name: &str) -> ApiResult<BTreeMap<String, FieldSchema>> {
        let registry = &self.registry;
        let fields = match category {
            Category::Inputs => registry.input(name).map(|f| derive_schema(&*f())),
            Category::Processors => registry.processor(name).map(|f| derive_schema(&*f())),
            Category::Aggregators => registry.aggregator(name).map(|f| derive_schema(&*f())),
            Category::Outputs => registry.output(name).map(|f| derive_schema(&*f())),
        };
        match fields {
            Some(fields) => Ok(fields?),
            None => Err(ApiError::unknown_type(&category.qualify(name))),
        }
    }

    /// Every tracked instance with its merged wrapper and plugin settings.
    pub async fn list_running(&self) -> Vec<RunningPluginDescriptor> {
        let inputs = join_all(self.agent.running_inputs().into_iter().map(|input| async move {
            RunningPluginDescriptor {
                id: input.id(),
                display_name: input.log_name(),
                snapshot: input.snapshot().await,
            }
        }))
        .await;

        let processors = self
            .agent
            .running_processors()
            .into_iter()
            .map(|unit| RunningPluginDescriptor {
                id: unit.id(),
                display_name: unit.log_name(),
                snapshot: unit.snapshot(),
            });

        let outputs = join_all(self.agent.running_outputs().into_iter().map(|output| async move {
            RunningPluginDescriptor {
                id: output.id(),
                display_name: output.log_name(),
                snapshot: output.snapshot().await,
            }
        }))
        .await;

        inputs.into_iter().chain(processors).chain(outputs).collect()
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────────

    /// Creates and starts an instance, returning its ID.
    pub fn create(&self, request: &PluginConfigRequest) -> ApiResult<PluginId> {
        self.create_with_id(request, None)
    }

    fn create_with_id(
        &self,
        request: &PluginConfigRequest,
        forced: Option<PluginId>,
    ) -> ApiResult<PluginId> {
        let type_name = request.type_name.as_str();
        info!(plugin = %type_name, "Creating plugin");

        let (category, name) =
            Category::split_qualified(type_name).ok_or_else(|| ApiError::unknown_type(type_name))?;
        let fields = &request.fields;
        let id = match category {
            Category::Inputs => self.create_input(name, fields, forced)?,
            Category::Processors => self.create_processor(name, fields, forced)?,
            Category::Aggregators => self.create_aggregator(name, fields, forced)?,
            Category::Outputs => self.create_output(name, fields, forced)?,
        };

        info!(plugin = %type_name, id = %id, "Plugin created");
        Ok(id)
    }

    fn create_input(
        &self,
        name: &str,
        fields: &FieldMap,
        forced: Option<PluginId>,
    ) -> ApiResult<PluginId> {
        let type_name = Category::Inputs.qualify(name);
        let factory = self
            .registry
            .input(name)
            .ok_or_else(|| ApiError::unknown_type(&type_name))?;
        let mut plugin = factory();
        bind_fields(&type_name, &mut *plugin, fields)?;

        if let Some(target) = plugin.as_parser_input() {
            let config = parser_config(&type_name, name, fields)?;
            let parser = new_parser(&config).map_err(|err| ApiError::bad_request(&type_name, err))?;
            target.set_parser(parser);
        }
        if let Some(target) = plugin.as_parser_func_input() {
            let config = parser_config(&type_name, name, fields)?;
            target.set_parser_func(Arc::new(move || new_parser(&config)));
        }

        let mut config = InputConfig::new(name);
        bind_fields(&type_name, &mut config, fields)?;

        let id = self.assign_id(&type_name, forced)?;
        let mut input = RunningInput::new(plugin, config, id);
        input.set_default_tags(self.agent.default_tags());
        input.init().map_err(|err| init_failed(&type_name, err))?;

        let input = Arc::new(input);
        self.agent.add_input(Arc::clone(&input));
        self.announce(id, type_name, fields);
        self.agent.run_input(input);
        Ok(id)
    }

    fn create_output(
        &self,
        name: &str,
        fields: &FieldMap,
        forced: Option<PluginId>,
    ) -> ApiResult<PluginId> {
        let type_name = Category::Outputs.qualify(name);
        let factory = self
            .registry
            .output(name)
            .ok_or_else(|| ApiError::unknown_type(&type_name))?;
        let mut plugin = factory();
        bind_fields(&type_name, &mut *plugin, fields)?;

        let mut config = OutputConfig::new(name);
        bind_fields(&type_name, &mut config, fields)?;

        if let Some(target) = plugin.as_serializer_output() {
            let mut serializer_config = SerializerConfig::default();
            bind_fields(&type_name, &mut serializer_config, fields)?;
            let serializer = new_serializer(&serializer_config)
                .map_err(|err| ApiError::bad_request(&type_name, err))?;
            target.set_serializer(serializer);
        }

        let id = self.assign_id(&type_name, forced)?;
        let mut output = RunningOutput::new(
            plugin,
            config,
            id,
            self.agent.metric_batch_size(),
            self.agent.metric_buffer_limit(),
        );
        output.init().map_err(|err| init_failed(&type_name, err))?;

        let output = Arc::new(output);
        self.agent.add_output(Arc::clone(&output));
        self.announce(id, type_name, fields);
        self.agent.run_output(output);
        Ok(id)
    }

    fn create_processor(
        &self,
        name: &str,
        fields: &FieldMap,
        forced: Option<PluginId>,
    ) -> ApiResult<PluginId> {
        let type_name = Category::Processors.qualify(name);
        let factory = self
            .registry
            .processor(name)
            .ok_or_else(|| ApiError::unknown_type(&type_name))?;
        let mut plugin = factory();
        bind_fields(&type_name, &mut *plugin, fields)?;

        let mut config = ProcessorConfig::new(name);
        bind_fields(&type_name, &mut config, fields)?;

        let id = self.assign_id(&type_name, forced)?;
        let mut processor = RunningProcessor::new(plugin, config, id);
        processor.init().map_err(|err| init_failed(&type_name, err))?;

        let unit = ProcessorUnit::Processor(Arc::new(processor));
        self.agent.add_processor(unit.clone());
        self.announce(id, type_name, fields);
        self.agent.run_processor(unit);
        Ok(id)
    }

    fn create_aggregator(
        &self,
        name: &str,
        fields: &FieldMap,
        forced: Option<PluginId>,
    ) -> ApiResult<PluginId> {
        let type_name = Category::Aggregators.qualify(name);
        let factory = self
            .registry
            .aggregator(name)
            .ok_or_else(|| ApiError::unknown_type(&type_name))?;
        let mut plugin = factory();
        bind_fields(&type_name, &mut *plugin, fields)?;

        let mut config = AggregatorConfig::new(name);
        bind_fields(&type_name, &mut config, fields)?;

        let id = self.assign_id(&type_name, forced)?;
        let mut aggregator = RunningAggregator::new(plugin, config, id);
        aggregator.init().map_err(|err| init_failed(&type_name, err))?;

        let unit = ProcessorUnit::Aggregator(Arc::new(aggregator));
        self.agent.add_processor(unit.clone());
        self.announce(id, type_name, fields);
        self.agent.run_processor(unit);
        Ok(id)
    }

    /// Picks the ID of a new instance. A forced ID must not be in use.
    fn assign_id(&self, type_name: &str, forced: Option<PluginId>) -> ApiResult<PluginId> {
        if let Some(id) = forced {
            if self.agent.is_tracked(id) {
                return Err(ApiError::bad_request(
                    type_name,
                    format!("plugin id {id} is still in use"),
                ));
            }
            return Ok(id);
        }
        loop {
            let id = PluginId::new(Uuid::new_v4().as_u64_pair().0);
            if !self.agent.is_tracked(id) {
                return Ok(id);
            }
        }
    }

    fn announce(&self, id: PluginId, type_name: String, fields: &FieldMap) {
        self.hooks.fire_added(&PluginEvent {
            id: id.to_string(),
            type_name: Some(type_name),
            fields: fields.clone(),
        });
    }

    /// Replaces an instance: deletes it, waits for it to stop, then creates
    /// the new configuration under the same ID.
    ///
    /// Nothing is created when the old instance outlives the update timeout.
    pub async fn update(&self, id: &str, request: &PluginConfigRequest) -> ApiResult<PluginId> {
        let parsed: PluginId = id.parse().map_err(|_| ApiError::unknown_instance(id))?;
        info!(id = %parsed, plugin = %request.type_name, "Updating plugin");
        self.delete(id)?;

        let timeout = self.update_timeout.to_std().unwrap_or_default();
        tokio::select! {
            _ = self.shutdown.cancelled() => {
                warn!(id = %parsed, "Update cancelled by shutdown");
                return Err(ApiError::Cancelled { id: parsed });
            }
            waited = tokio::time::timeout(timeout, self.wait_until_dead(parsed)) => {
                if waited.is_err() {
                    warn!(id = %parsed, timeout = %self.update_timeout, "Plugin did not stop in time");
                    return Err(ApiError::Timeout {
                        id: parsed,
                        waited: self.update_timeout,
                    });
                }
            }
        }

        self.create_with_id(request, Some(parsed))
    }

    async fn wait_until_dead(&self, id: PluginId) {
        let period = self
            .poll_interval
            .to_std()
            .unwrap_or_default()
            .max(std::time::Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if self.state_of(id) == PluginState::Dead {
                return;
            }
        }
    }

    /// Requests an instance to stop. Does not wait for it.
    ///
    /// The remove hook fires before the lookup, even for unknown IDs.
    pub fn delete(&self, id: &str) -> ApiResult<()> {
        let parsed = id.parse::<PluginId>().ok();
        self.hooks.fire_removed(&PluginEvent {
            id: id.to_string(),
            type_name: parsed.and_then(|id| self.type_name_of(id)),
            fields: FieldMap::new(),
        });

        match parsed {
            Some(parsed) if self.stop(parsed) => Ok(()),
            _ => Err(ApiError::unknown_instance(id)),
        }
    }

    fn stop(&self, id: PluginId) -> bool {
        if let Some(input) = self.agent.running_inputs().into_iter().find(|i| i.id() == id) {
            info!(plugin = %input.log_name(), id = %id, "Stopping plugin");
            self.agent.stop_input(&input);
            return true;
        }
        if let Some(unit) = self.agent.running_processors().into_iter().find(|u| u.id() == id) {
            info!(plugin = %unit.log_name(), id = %id, "Stopping plugin");
            self.agent.stop_processor(&unit);
            return true;
        }
        if let Some(output) = self.agent.running_outputs().into_iter().find(|o| o.id() == id) {
            info!(plugin = %output.log_name(), id = %id, "Stopping plugin");
            self.agent.stop_output(&output);
            return true;
        }
        false
    }

    /// Lifecycle state of an instance; unknown IDs report `Dead`.
    pub fn status(&self, id: &str) -> PluginState {
        id.parse()
            .map(|id| self.state_of(id))
            .unwrap_or(PluginState::Dead)
    }

    fn state_of(&self, id: PluginId) -> PluginState {
        self.agent.instance_state(id).unwrap_or(PluginState::Dead)
    }

    fn type_name_of(&self, id: PluginId) -> Option<String> {
        if let Some(input) = self.agent.running_inputs().iter().find(|i| i.id() == id) {
            return Some(input.type_name());
        }
        if let Some(unit) = self.agent.running_processors().iter().find(|u| u.id() == id) {
            return Some(unit.type_name());
        }
        self.agent
            .running_outputs()
            .iter()
            .find(|o| o.id() == id)
            .map(|output| output.type_name())
    }
}

fn bind_fields<C>(type_name: &str, dest: &mut C, fields: &FieldMap) -> ApiResult<()>
where
    C: Configurable + ?Sized,
{
    bind(dest, fields).map_err(|err| ApiError::bind(type_name, err))
}

fn parser_config(type_name: &str, name: &str, fields: &FieldMap) -> ApiResult<ParserConfig> {
    let mut config = ParserConfig::for_plugin(name);
    bind_fields(type_name, &mut config, fields)?;
    Ok(config)
}

fn init_failed(type_name: &str, err: impl std::fmt::Display) -> ApiError {
    ApiError::bad_request(type_name, format!("could not initialize plugin: {err}"))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::{Mutex, RwLock};
    use serde_json::{Value, json};
    use tally_core::{BindError, ConfigValue, Describe, Shape};
    use tally_framework::format::{Parser, ParserInput};
    use tally_framework::{
        Accumulator, Aggregator, Input, Metric, Output, PluginError, PluginResult, Processor,
    };
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::api::error::ErrorKind;

    // ===== Test plugins =====

    #[derive(Default, Configurable)]
    struct Ping {
        pub percpu: bool,
        pub timeout: Duration,
        pub servers: Vec<String>,
    }

    #[async_trait]
    impl Input for Ping {
        fn init(&mut self) -> PluginResult<()> {
            if self.servers.iter().any(|s| s.is_empty()) {
                return Err(PluginError::config("empty server address"));
            }
            Ok(())
        }

        async fn gather(&mut self, acc: &mut Accumulator) -> PluginResult<()> {
            acc.add_fields("ping", [("up", true)], BTreeMap::new());
            Ok(())
        }
    }

    #[derive(Default, Configurable)]
    struct Lines {
        pub files: Vec<String>,
        parser: Option<Box<dyn Parser>>,
    }

    #[async_trait]
    impl Input for Lines {
        fn init(&mut self) -> PluginResult<()> {
            match self.parser {
                Some(_) => Ok(()),
                None => Err(PluginError::config("no parser")),
            }
        }

        async fn gather(&mut self, _acc: &mut Accumulator) -> PluginResult<()> {
            Ok(())
        }

        fn as_parser_input(&mut self) -> Option<&mut dyn ParserInput> {
            Some(self)
        }
    }

    impl ParserInput for Lines {
        fn set_parser(&mut self, parser: Box<dyn Parser>) {
            self.parser = Some(parser);
        }
    }

    #[derive(Default, Configurable)]
    struct Pass {
        pub suffix: String,
    }

    impl Processor for Pass {
        fn apply(&mut self, metrics: Vec<Metric>) -> Vec<Metric> {
            metrics
        }
    }

    #[derive(Default, Configurable)]
    struct Count {
        pub fields: Vec<String>,
    }

    impl Aggregator for Count {
        fn add(&mut self, _metric: &Metric) {}

        fn push(&mut self, _acc: &mut Accumulator) {}

        fn reset(&mut self) {}
    }

    #[derive(Default, Configurable)]
    struct Discard {
        pub quiet: bool,
    }

    #[async_trait]
    impl Output for Discard {
        async fn write(&mut self, _metrics: &[Metric]) -> PluginResult<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Opaque;

    impl Describe for Opaque {
        fn shape() -> Shape {
            Shape::Unknown("Opaque")
        }
    }

    impl ConfigValue for Opaque {
        fn assign(&mut self, source: &Value) -> Result<(), BindError> {
            Err(BindError::mismatch("opaque", source))
        }

        fn snapshot(&self) -> Value {
            Value::Null
        }

        fn is_zero(&self) -> bool {
            true
        }
    }

    #[derive(Default, Configurable)]
    struct Broken {
        pub handle: Opaque,
    }

    #[async_trait]
    impl Input for Broken {
        async fn gather(&mut self, _acc: &mut Accumulator) -> PluginResult<()> {
            Ok(())
        }
    }

    fn ping() -> Box<dyn Input> {
        Box::new(Ping::default())
    }

    fn lines() -> Box<dyn Input> {
        Box::new(Lines::default())
    }

    fn broken() -> Box<dyn Input> {
        Box::new(Broken::default())
    }

    fn pass() -> Box<dyn Processor> {
        Box::new(Pass::default())
    }

    fn count() -> Box<dyn Aggregator> {
        Box::new(Count::default())
    }

    fn discard() -> Box<dyn Output> {
        Box::new(Discard::default())
    }

    fn registry() -> Arc<PluginRegistry> {
        Arc::new(
            PluginRegistry::new()
                .with_input("ping", ping)
                .with_input("lines", lines)
                .with_processor("pass", pass)
                .with_aggregator("count", count)
                .with_output("discard", discard),
        )
    }

    // ===== Mock agent =====

    /// Tracks instances in memory. Stops complete immediately unless
    /// `stuck` is set.
    #[derive(Default)]
    struct MockAgent {
        inputs: RwLock<Vec<Arc<RunningInput>>>,
        processors: RwLock<Vec<ProcessorUnit>>,
        outputs: RwLock<Vec<Arc<RunningOutput>>>,
        stuck: AtomicBool,
        tag_reads: AtomicUsize,
    }

    impl AgentController for MockAgent {
        fn running_inputs(&self) -> Vec<Arc<RunningInput>> {
            self.inputs.read().clone()
        }

        fn running_processors(&self) -> Vec<ProcessorUnit> {
            self.processors.read().clone()
        }

        fn running_outputs(&self) -> Vec<Arc<RunningOutput>> {
            self.outputs.read().clone()
        }

        fn add_input(&self, input: Arc<RunningInput>) {
            self.inputs.write().push(input);
        }

        fn add_processor(&self, unit: ProcessorUnit) {
            self.processors.write().push(unit);
        }

        fn add_output(&self, output: Arc<RunningOutput>) {
            self.outputs.write().push(output);
        }

        fn run_input(&self, input: Arc<RunningInput>) {
            input.set_state(PluginState::Running);
        }

        fn run_processor(&self, unit: ProcessorUnit) {
            unit.set_state(PluginState::Running);
        }

        fn run_output(&self, output: Arc<RunningOutput>) {
            output.set_state(PluginState::Running);
        }

        fn stop_input(&self, input: &Arc<RunningInput>) {
            input.request_stop();
            if !self.stuck.load(Ordering::SeqCst) {
                input.set_state(PluginState::Dead);
                self.inputs.write().retain(|i| i.id() != input.id());
            }
        }

        fn stop_processor(&self, unit: &ProcessorUnit) {
            unit.request_stop();
            if !self.stuck.load(Ordering::SeqCst) {
                unit.set_state(PluginState::Dead);
                self.processors.write().retain(|u| u.id() != unit.id());
            }
        }

        fn stop_output(&self, output: &Arc<RunningOutput>) {
            output.request_stop();
            if !self.stuck.load(Ordering::SeqCst) {
                output.set_state(PluginState::Dead);
                self.outputs.write().retain(|o| o.id() != output.id());
            }
        }

        fn default_tags(&self) -> BTreeMap<String, String> {
            self.tag_reads.fetch_add(1, Ordering::SeqCst);
            BTreeMap::from([("host".to_string(), "test".to_string())])
        }

        fn metric_batch_size(&self) -> usize {
            100
        }

        fn metric_buffer_limit(&self) -> usize {
            1000
        }
    }

    fn fields(value: Value) -> FieldMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn request(type_name: &str, value: Value) -> PluginConfigRequest {
        PluginConfigRequest::new(type_name, fields(value))
    }

    fn setup() -> (ConfigApi, Arc<MockAgent>) {
        let agent = Arc::new(MockAgent::default());
        let settings = ApiConfig {
            update_timeout: Duration::from_millis(200),
            update_poll_interval: Duration::from_millis(10),
        };
        let api = ConfigApi::with_settings(registry(), agent.clone(), &settings);
        (api, agent)
    }

    // ===== Catalogue =====

    #[test]
    fn list_types_in_catalogue_order() {
        let (api, _) = setup();
        let types = assert_ok!(api.list_types());
        let names: Vec<&str> = types.iter().map(|t| t.qualified_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "inputs.lines",
                "inputs.ping",
                "processors.pass",
                "aggregators.count",
                "outputs.discard",
            ]
        );

        let ping = &types[1].fields;
        assert_eq!(ping.len(), 3);
        assert_eq!(ping["timeout"].field_type, tally_core::FieldType::Duration);
        assert!(!ping.contains_key("interval"));
    }

    #[test]
    fn undescribable_type_fails_the_listing() {
        let agent = Arc::new(MockAgent::default());
        let registry = Arc::new(
            PluginRegistry::new()
                .with_input("ping", ping)
                .with_input("broken", broken),
        );
        let api = ConfigApi::new(registry, agent);
        let err = assert_err!(api.list_types());
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    // ===== Create =====

    #[tokio::test]
    async fn create_binds_plugin_and_wrapper() {
        let (api, agent) = setup();
        let id = assert_ok!(api.create(&request(
            "inputs.ping",
            json!({"percpu": true, "timeout": "1h30m", "interval": "5s", "alias": "main", "namepass": ["cpu*"]}),
        )));

        assert_eq!(api.status(&id.to_string()), PluginState::Running);
        let input = agent.running_inputs().pop().unwrap();
        assert_eq!(input.id(), id);
        assert_eq!(input.config().interval, Duration::from_secs(5));
        assert_eq!(input.config().filter.namepass, vec!["cpu*".to_string()]);

        let running = api.list_running().await;
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].display_name, "inputs.ping::main");
        assert_eq!(running[0].snapshot["percpu"], json!(true));
        assert_eq!(running[0].snapshot["timeout"], json!("1h30m0s"));
        assert_eq!(running[0].snapshot["interval"], json!("5s"));
    }

    #[test]
    fn unknown_types_are_not_found() {
        let (api, _) = setup();
        for name in ["bogus.nothing", "inputs.nothing", "inputs", "ping"] {
            let err = assert_err!(api.create(&request(name, json!({}))));
            assert_eq!(err.kind(), ErrorKind::NotFound, "{name}");
        }
    }

    #[test]
    fn bad_duration_is_a_bad_request() {
        let (api, agent) = setup();
        let err = assert_err!(api.create(&request(
            "inputs.ping",
            json!({"timeout": "not-a-duration"})
        )));
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        let ApiError::BadRequest { plugin, field, .. } = err else {
            panic!("expected a bad request");
        };
        assert_eq!(plugin, "inputs.ping");
        assert_eq!(field.as_deref(), Some("timeout"));
        assert!(agent.running_inputs().is_empty());
    }

    #[test]
    fn failed_init_is_a_bad_request() {
        let (api, agent) = setup();
        let err = assert_err!(api.create(&request("inputs.ping", json!({"servers": [""]}))));
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert!(err.to_string().contains("could not initialize plugin"));
        assert!(agent.running_inputs().is_empty());
    }

    #[test]
    fn default_tags_are_set_before_init() {
        let (api, agent) = setup();
        assert_err!(api.create(&request("inputs.ping", json!({"servers": [""]}))));
        assert_eq!(agent.tag_reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn parser_inputs_receive_a_parser() {
        let (api, _) = setup();
        assert_ok!(api.create(&request("inputs.lines", json!({"data_format": "json"}))));

        let err = assert_err!(api.create(&request("inputs.lines", json!({"data_format": "bogus"}))));
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn categories_land_in_their_lists() {
        let (api, agent) = setup();
        let processor = assert_ok!(api.create(&request("processors.pass", json!({"order": 2}))));
        let aggregator = assert_ok!(api.create(&request("aggregators.count", json!({"period": "10s"}))));
        let output = assert_ok!(api.create(&request(
            "outputs.discard",
            json!({"metric_batch_size": 10})
        )));

        let units = agent.running_processors();
        assert_eq!(units.len(), 2);
        assert!(units.iter().any(|u| u.id() == processor));
        assert!(units.iter().any(|u| u.id() == aggregator && u.type_name() == "aggregators.count"));

        let outputs = agent.running_outputs();
        assert_eq!(outputs[0].id(), output);
        assert_eq!(outputs[0].batch_size(), 10);
        assert_eq!(outputs[0].buffer_limit(), 1000);

        for id in [processor, aggregator, output] {
            assert_eq!(api.status(&id.to_string()), PluginState::Running);
        }
    }

    #[tokio::test]
    async fn inputs_get_default_tags() {
        let (api, agent) = setup();
        assert_ok!(api.create(&request("inputs.ping", json!({"tags": {"dc": "east"}}))));
        let input = agent.running_inputs().pop().unwrap();
        let metrics = assert_ok!(input.gather().await);
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].tags()["host"], "test");
        assert_eq!(metrics[0].tags()["dc"], "east");
    }

    #[test]
    fn forced_id_in_use_is_rejected() {
        let (api, _) = setup();
        let id = assert_ok!(api.create(&request("inputs.ping", json!({}))));
        let err = assert_err!(api.create_with_id(&request("inputs.ping", json!({})), Some(id)));
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    // ===== Hooks =====

    #[test]
    fn hooks_fire_on_create_and_delete() {
        let (api, _) = setup();
        let added = Arc::new(Mutex::new(Vec::new()));
        let removed = Arc::new(Mutex::new(Vec::new()));
        {
            let added = Arc::clone(&added);
            api.hooks().on_plugin_added(move |event| added.lock().push(event.clone()));
            let removed = Arc::clone(&removed);
            api.hooks().on_plugin_removed(move |event| removed.lock().push(event.clone()));
        }

        let id = assert_ok!(api.create(&request("inputs.ping", json!({"percpu": true}))));
        {
            let added = added.lock();
            assert_eq!(added.len(), 1);
            assert_eq!(added[0].id, id.to_string());
            assert_eq!(added[0].type_name.as_deref(), Some("inputs.ping"));
            assert_eq!(added[0].fields["percpu"], json!(true));
        }

        assert_ok!(api.delete(&id.to_string()));
        let removed = removed.lock();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, id.to_string());
        assert_eq!(removed[0].type_name.as_deref(), Some("inputs.ping"));
    }

    // ===== Delete / status =====

    #[test]
    fn delete_unknown_is_not_found() {
        let (api, _) = setup();
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = Arc::clone(&fired);
            api.hooks().on_plugin_removed(move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        let err = assert_err!(api.delete("00000000000000ff"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = assert_err!(api.delete("not-an-id"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn status_of_unknown_is_dead() {
        let (api, _) = setup();
        assert_eq!(api.status("00000000000000ff"), PluginState::Dead);
        assert_eq!(api.status("garbage"), PluginState::Dead);
    }

    #[test]
    fn stuck_delete_leaves_instance_stopping() {
        let (api, agent) = setup();
        agent.stuck.store(true, Ordering::SeqCst);
        let id = assert_ok!(api.create(&request("outputs.discard", json!({}))));
        assert_ok!(api.delete(&id.to_string()));
        assert_eq!(api.status(&id.to_string()), PluginState::Stopping);
    }

    // ===== Update =====

    #[tokio::test]
    async fn update_recreates_under_the_same_id() {
        let (api, agent) = setup();
        let id = assert_ok!(api.create(&request("inputs.ping", json!({"percpu": false}))));
        let updated = assert_ok!(
            api.update(&id.to_string(), &request("inputs.ping", json!({"percpu": true})))
                .await
        );

        assert_eq!(updated, id);
        assert_eq!(agent.running_inputs().len(), 1);
        let running = api.list_running().await;
        assert_eq!(running[0].id, id);
        assert_eq!(running[0].snapshot["percpu"], json!(true));
        assert_eq!(api.status(&id.to_string()), PluginState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn update_times_out_when_the_old_instance_lingers() {
        let (api, agent) = setup();
        let id = assert_ok!(api.create(&request("inputs.ping", json!({}))));
        agent.stuck.store(true, Ordering::SeqCst);

        let err = assert_err!(
            api.update(&id.to_string(), &request("inputs.ping", json!({"percpu": true})))
                .await
        );
        assert_eq!(err.kind(), ErrorKind::Timeout);

        let inputs = agent.running_inputs();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].id(), id);
        assert_eq!(inputs[0].state(), PluginState::Stopping);
    }

    #[tokio::test]
    async fn update_aborts_on_shutdown() {
        let (api, agent) = setup();
        let id = assert_ok!(api.create(&request("inputs.ping", json!({}))));
        agent.stuck.store(true, Ordering::SeqCst);
        api.shutdown();

        let err = assert_err!(api.update(&id.to_string(), &request("inputs.ping", json!({}))).await);
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn update_of_unknown_is_not_found() {
        let (api, _) = setup();
        let err = assert_err!(api.update("xyz", &request("inputs.ping", json!({}))).await);
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = assert_err!(
            api.update("00000000000000ff", &request("inputs.ping", json!({})))
                .await
        );
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
