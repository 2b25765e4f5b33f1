use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex as SyncMutex, RwLock};
use tally_core::{Duration, FieldMap, extract};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{Lifecycle, lifecycle_accessors, merge_snapshots};
use crate::error::PluginResult;
use crate::metric::Metric;
use crate::models::config::OutputConfig;
use crate::models::id::PluginId;
use crate::plugin::{Category, Output};

/// An output plugin tracked by the agent, with its metric buffer.
pub struct RunningOutput {
    lifecycle: Lifecycle,
    config: OutputConfig,
    plugin: Mutex<Box<dyn Output>>,
    batch_size: usize,
    buffer_limit: usize,
    buffer: SyncMutex<VecDeque<Metric>>,
    dropped: AtomicU64,
    idle_snapshot: RwLock<FieldMap>,
}

impl RunningOutput {
    /// Wraps `plugin`; the agent's batch size and buffer limit apply unless
    /// the wrapper configuration sets its own.
    pub fn new(
        plugin: Box<dyn Output>,
        config: OutputConfig,
        id: PluginId,
        agent_batch_size: usize,
        agent_buffer_limit: usize,
    ) -> Self {
        let batch_size = match config.metric_batch_size {
            0 => agent_batch_size,
            n => n,
        }
        .max(1);
        let buffer_limit = match config.metric_buffer_limit {
            0 => agent_buffer_limit,
            n => n,
        }
        .max(batch_size);
        let idle_snapshot = RwLock::new(extract(&*plugin));
        Self {
            lifecycle: Lifecycle::new(id, Category::Outputs, &config.name, &config.alias),
            config,
            plugin: Mutex::new(plugin),
            batch_size,
            buffer_limit,
            buffer: SyncMutex::new(VecDeque::new()),
            dropped: AtomicU64::new(0),
            idle_snapshot,
        }
    }

    lifecycle_accessors!();

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn buffer_limit(&self) -> usize {
        self.buffer_limit
    }

    /// Flush interval, falling back to `agent_interval` when unset.
    pub fn flush_interval(&self, agent_interval: Duration) -> Duration {
        if self.config.flush_interval.is_zero() {
            agent_interval
        } else {
            self.config.flush_interval
        }
    }

    /// Number of buffered metrics.
    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Metrics discarded because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Compiles the filter and initialises the plugin.
    pub fn init(&mut self) -> PluginResult<()> {
        self.config.filter.compile()?;
        let plugin = self.plugin.get_mut();
        let result = plugin.init();
        *self.idle_snapshot.get_mut() = extract(&**plugin);
        result
    }

    pub async fn connect(&self) -> PluginResult<()> {
        let mut plugin = self.plugin.lock().await;
        let result = plugin.connect().await;
        *self.idle_snapshot.write() = extract(&**plugin);
        result
    }

    pub async fn close(&self) -> PluginResult<()> {
        let mut plugin = self.plugin.lock().await;
        let result = plugin.close().await;
        *self.idle_snapshot.write() = extract(&**plugin);
        result
    }

    /// Buffers a metric; returns `true` once a full batch is waiting.
    pub fn add_metric(&self, metric: Metric) -> bool {
        let Some(mut metric) = self.config.filter.apply(metric) else {
            return false;
        };
        if !self.config.name_override.is_empty() {
            metric.set_name(self.config.name_override.clone());
        }

        let mut buffer = self.buffer.lock();
        if buffer.len() >= self.buffer_limit {
            buffer.pop_front();
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped.is_power_of_two() {
                warn!(
                    output = %self.log_name(),
                    dropped,
                    "Metric buffer full, dropping oldest metrics"
                );
            }
        }
        buffer.push_back(metric);
        buffer.len() >= self.batch_size
    }

    /// Writes one batch; on failure the batch goes back to the front of the
    /// buffer. Returns the number of metrics written.
    pub async fn write_batch(&self) -> PluginResult<usize> {
        let batch: Vec<Metric> = {
            let mut buffer = self.buffer.lock();
            let count = buffer.len().min(self.batch_size);
            buffer.drain(..count).collect()
        };
        if batch.is_empty() {
            return Ok(0);
        }

        let result = {
            let mut plugin = self.plugin.lock().await;
            let result = plugin.write(&batch).await;
            *self.idle_snapshot.write() = extract(&**plugin);
            result
        };
        match result {
            Ok(()) => {
                debug!(output = %self.log_name(), count = batch.len(), "Wrote batch");
                Ok(batch.len())
            }
            Err(err) => {
                let mut buffer = self.buffer.lock();
                for metric in batch.into_iter().rev() {
                    if buffer.len() >= self.buffer_limit {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    buffer.push_front(metric);
                }
                Err(err)
            }
        }
    }

    /// Writes batches until the buffer is empty or a write fails.
    pub async fn flush(&self) -> PluginResult<()> {
        while self.write_batch().await? > 0 {}
        Ok(())
    }

    /// Current wrapper and plugin field values.
    ///
    /// Never waits on a connect or write in progress: while the plugin is
    /// busy its fields come from the copy taken when it was last idle.
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
