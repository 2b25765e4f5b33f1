//! Serializers turning metrics into bytes.

use serde_json::{Map, Value, json};
use tally_core::{Configurable, Duration};

use super::line_protocol;
use crate::error::FormatError;
use crate::metric::{FieldValue, Metric};

/// Encodes metrics for an output.
pub trait Serializer: Send + Sync {
    fn serialize(&self, metric: &Metric) -> Result<Vec<u8>, FormatError>;

    /// Encodes a whole batch; defaults to concatenating single metrics.
    fn serialize_batch(&self, metrics: &[Metric]) -> Result<Vec<u8>, FormatError> {
        let mut out = Vec::new();
        for metric in metrics {
            out.extend(self.serialize(metric)?);
        }
        Ok(out)
    }
}

/// Outputs that accept a serializer built from their configuration.
pub trait SerializerOutput {
    fn set_serializer(&mut self, serializer: Box<dyn Serializer>);
}

/// Options shared by all serializers, bound from the plugin's field set.
#[derive(Debug, Clone, Configurable)]
pub struct SerializerConfig {
    pub data_format: String,
    /// Timestamp precision of the `json` format.
    #[config(name = "json_timestamp_units")]
    pub timestamp_units: Duration,
    pub influx_uint_support: bool,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            data_format: "influx".to_string(),
            timestamp_units: Duration::from_secs(1),
            influx_uint_support: false,
        }
    }
}

/// Builds the serializer selected by `config.data_format`.
pub fn new_serializer(config: &SerializerConfig) -> Result<Box<dyn Serializer>, FormatError> {
    match config.data_format.as_str() {
        "influx" => Ok(Box::new(InfluxSerializer {
            uint_support: config.influx_uint_support,
        })),
        "json" => {
            let units = config.timestamp_units.as_nanos();
            if units <= 0 {
                return Err(FormatError::InvalidConfig {
                    format: "json",
                    reason: "json_timestamp_units must be positive".to_string(),
                });
            }
            Ok(Box::new(JsonSerializer { units }))
        }
        other => Err(FormatError::UnknownFormat(other.to_string())),
    }
}

struct InfluxSerializer {
    uint_support: bool,
}

impl Serializer for InfluxSerializer {
    fn serialize(&self, metric: &Metric) -> Result<Vec<u8>, FormatError> {
        let mut line = line_protocol::encode(metric, self.uint_support);
        line.push('\n');
        Ok(line.into_bytes())
    }
}

struct JsonSerializer {
    units: i64,
}

impl JsonSerializer {
    fn document(&self, metric: &Metric) -> Value {
        let fields: Map<String, Value> = metric
            .fields()
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    FieldValue::Float(v) => json!(v),
                    FieldValue::Integer(v) => json!(v),
                    FieldValue::Unsigned(v) => json!(v),
                    FieldValue::Bool(v) => json!(v),
                    FieldValue::String(v) => json!(v),
                };
                (key.clone(), value)
            })
            .collect();
        json!({
            "name": metric.name(),
            "tags": metric.tags(),
            "fields": fields,
            "timestamp": metric.unix_nanos() / self.units,
        })
    }
}

impl Serializer for JsonSerializer {
    fn serialize(&self, metric: &Metric) -> Result<Vec<u8>, FormatError> {
        let mut out = serde_json::to_vec(&self.document(metric))?;
        out.push(b'\n');
        Ok(out)
    }

    fn serialize_batch(&self, metrics: &[Metric]) -> Result<Vec<u8>, FormatError> {
        let metrics: Vec<Value> = metrics.iter().map(|m| self.document(m)).collect();
        let mut out = serde_json::to_vec(&json!({ "metrics": metrics }))?;
        out.push(b'\n');
        Ok(out)
    }
}
