//! Configuration schema definitions.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tally_core::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TallyConfig {
    /// Agent-wide collection and flushing settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Tags added to every metric gathered by an input.
    #[serde(default)]
    pub global_tags: BTreeMap<String, String>,

    /// Plugin management settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ─── Agent ──────────────────────────────────────────────────────────────────

/// Agent-wide defaults; plugin wrapper settings take precedence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Default gather interval of inputs.
    #[serde(default = "default_interval")]
    pub interval: Duration,

    /// Default flush interval of outputs.
    #[serde(default = "default_interval")]
    pub flush_interval: Duration,

    /// Metrics written to an output per batch.
    #[serde(default = "default_batch_size")]
    pub metric_batch_size: usize,

    /// Metrics an output buffers before dropping the oldest.
    #[serde(default = "default_buffer_limit")]
    pub metric_buffer_limit: usize,

    /// Value of the `host` tag; detected when empty.
    #[serde(default)]
    pub hostname: String,

    /// Do not add a `host` tag.
    #[serde(default)]
    pub omit_hostname: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            flush_interval: default_interval(),
            metric_batch_size: default_batch_size(),
            metric_buffer_limit: default_buffer_limit(),
            hostname: String::new(),
            omit_hostname: false,
        }
    }
}

impl AgentConfig {
    /// The configured hostname, or the machine's when none is set.
    pub fn resolved_hostname(&self) -> String {
        if !self.hostname.is_empty() {
            return self.hostname.clone();
        }
        std::env::var("HOSTNAME")
            .ok()
            .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "localhost".to_string())
    }
}

fn default_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_batch_size() -> usize {
    1000
}

fn default_buffer_limit() -> usize {
    10_000
}

// ─── API ────────────────────────────────────────────────────────────────────

/// Settings of the plugin management API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// How long an update waits for the old instance to stop.
    #[serde(default = "default_update_timeout")]
    pub update_timeout: Duration,

    /// How often an update checks whether the old instance stopped.
    #[serde(default = "default_update_poll_interval")]
    pub update_poll_interval: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            update_timeout: default_update_timeout(),
            update_poll_interval: default_update_poll_interval(),
        }
    }
}

fn default_update_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_update_poll_interval() -> Duration {
    Duration::from_millis(100)
}

// ─── Logging ────────────────────────────────────────────────────────────────

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `compact` otherwise.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// When file output starts a new file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Minutely,
    Hourly,
    Daily,
}

/// Span lifecycle events to log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file, used when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Per-target levels, e.g. `tally_runtime = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Rotated files to keep; `0` keeps all.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file_path: None,
            thread_ids: false,
            file_location: false,
            span_events: SpanEventConfig::default(),
            filters: HashMap::new(),
            rotation: LogRotation::default(),
            max_files: default_max_files(),
        }
    }
}

fn default_max_files() -> usize {
    5
}
