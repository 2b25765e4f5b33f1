//! Parsers turning raw input into metrics.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde_json::Value;
use tally_core::Configurable;

use super::line_protocol;
use crate::error::FormatError;
use crate::metric::{FieldValue, Metric};

/// Decodes a buffer into metrics.
pub trait Parser: Send + Sync {
    fn parse(&self, buf: &[u8]) -> Result<Vec<Metric>, FormatError>;
}

/// Builds a new parser per use.
pub type ParserFactory = Arc<dyn Fn() -> Result<Box<dyn Parser>, FormatError> + Send + Sync>;

/// Inputs that accept a parser built from their configuration.
pub trait ParserInput {
    fn set_parser(&mut self, parser: Box<dyn Parser>);
}

/// Inputs that build their own parsers from a factory.
pub trait ParserFuncInput {
    fn set_parser_func(&mut self, factory: ParserFactory);
}

/// Options shared by all parsers, bound from the plugin's field set.
#[derive(Debug, Clone, Configurable)]
pub struct ParserConfig {
    pub data_format: String,
    pub metric_name: String,
    /// Fail on array elements that are not objects instead of skipping them.
    pub json_strict: bool,
    pub json_name_key: String,
    pub json_time_key: String,
    pub json_string_fields: Vec<String>,
    pub tag_keys: Vec<String>,
    /// Value type for the `value` format: integer, float, string or boolean.
    pub data_type: String,
    pub value_field_name: String,
    pub default_tags: BTreeMap<String, String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            data_format: "influx".to_string(),
            metric_name: String::new(),
            json_strict: true,
            json_name_key: String::new(),
            json_time_key: String::new(),
            json_string_fields: Vec::new(),
            tag_keys: Vec::new(),
            data_type: String::new(),
            value_field_name: "value".to_string(),
            default_tags: BTreeMap::new(),
        }
    }
}

impl ParserConfig {
    /// Baseline configuration for a plugin.
    pub fn for_plugin(metric_name: &str) -> Self {
        Self {
            metric_name: metric_name.to_string(),
            ..Self::default()
        }
    }
}

/// Builds the parser selected by `config.data_format`.
pub fn new_parser(config: &ParserConfig) -> Result<Box<dyn Parser>, FormatError> {
    let parser: Box<dyn Parser> = match config.data_format.as_str() {
        "influx" => Box::new(InfluxParser {
            default_tags: config.default_tags.clone(),
        }),
        "json" => Box::new(JsonParser::new(config)?),
        "value" => Box::new(ValueParser::new(config)?),
        other => return Err(FormatError::UnknownFormat(other.to_string())),
    };
    Ok(parser)
}

fn apply_default_tags(metrics: &mut [Metric], tags: &BTreeMap<String, String>) {
    for metric in metrics {
        for (key, value) in tags {
            metric.add_tag_if_absent(key, value);
        }
    }
}

// ─── influx ─────────────────────────────────────────────────────────────────

struct InfluxParser {
    default_tags: BTreeMap<String, String>,
}

impl Parser for InfluxParser {
    fn parse(&self, buf: &[u8]) -> Result<Vec<Metric>, FormatError> {
        let text = std::str::from_utf8(buf)
            .map_err(|err| FormatError::parse("influx", 0, err.to_string()))?;
        let mut metrics = line_protocol::decode(text)?;
        apply_default_tags(&mut metrics, &self.default_tags);
        Ok(metrics)
    }
}

// ─── json ───────────────────────────────────────────────────────────────────

struct JsonParser {
    metric_name: String,
    strict: bool,
    name_key: String,
    time_key: String,
    string_fields: Vec<String>,
    tag_keys: Vec<String>,
    default_tags: BTreeMap<String, String>,
}

impl JsonParser {
    fn new(config: &ParserConfig) -> Result<Self, FormatError> {
        if config.metric_name.is_empty() && config.json_name_key.is_empty() {
            return Err(FormatError::InvalidConfig {
                format: "json",
                reason: "either metric_name or json_name_key must be set".to_string(),
            });
        }
        Ok(Self {
            metric_name: config.metric_name.clone(),
            strict: config.json_strict,
            name_key: config.json_name_key.clone(),
            time_key: config.json_time_key.clone(),
            string_fields: config.json_string_fields.clone(),
            tag_keys: config.tag_keys.clone(),
            default_tags: config.default_tags.clone(),
        })
    }

    fn flatten(&self, prefix: &str, value: &Value, out: &mut BTreeMap<String, Value>) {
        match value {
            Value::Object(map) => {
                for (key, nested) in map {
                    let key = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{prefix}_{key}")
                    };
                    self.flatten(&key, nested, out);
                }
            }
            Value::Array(items) => {
                for (index, nested) in items.iter().enumerate() {
                    self.flatten(&format!("{prefix}_{index}"), nested, out);
                }
            }
            other => {
                out.insert(prefix.to_string(), other.clone());
            }
        }
    }

    fn metric(&self, object: &Value, now: SystemTime) -> Metric {
        let mut flat = BTreeMap::new();
        self.flatten("", object, &mut flat);

        let mut name = self.metric_name.clone();
        let mut time = now;
        let mut tags = self.default_tags.clone();
        let mut fields = BTreeMap::new();
        for (key, value) in flat {
            if !self.name_key.is_empty() && key == self.name_key {
                if let Value::String(text) = &value {
                    name = text.clone();
                }
                continue;
            }
            if !self.time_key.is_empty() && key == self.time_key {
                if let Some(secs) = value.as_f64().filter(|secs| *secs >= 0.0) {
                    time = SystemTime::UNIX_EPOCH + Duration::from_secs_f64(secs);
                }
                continue;
            }
            if self.tag_keys.contains(&key) {
                let text = match &value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                tags.insert(key, text);
                continue;
            }
            match value {
                Value::Number(number) => {
                    if let Some(float) = number.as_f64() {
                        fields.insert(key, FieldValue::Float(float));
                    }
                }
                Value::Bool(flag) => {
                    fields.insert(key, FieldValue::Bool(flag));
                }
                Value::String(text) if self.string_fields.contains(&key) => {
                    fields.insert(key, FieldValue::String(text));
                }
                _ => {}
            }
        }
        Metric::new(name, tags, fields, time)
    }
}

impl Parser for JsonParser {
    fn parse(&self, buf: &[u8]) -> Result<Vec<Metric>, FormatError> {
        let document: Value = serde_json::from_slice(buf)?;
        let now = SystemTime::now();
        let objects = match &document {
            Value::Object(_) => vec![&document],
            Value::Array(items) => {
                let mut objects = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    if item.is_object() {
                        objects.push(item);
                    } else if self.strict {
                        return Err(FormatError::parse(
                            "json",
                            index,
                            "array element is not an object",
                        ));
                    }
                }
                objects
            }
            _ => {
                return Err(FormatError::parse("json", 0, "expected an object or array"));
            }
        };
        Ok(objects
            .into_iter()
            .map(|object| self.metric(object, now))
            .filter(|metric| !metric.fields().is_empty())
            .collect())
    }
}

// ─── value ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum ValueType {
    Integer,
    Float,
    String,
    Boolean,
}

struct ValueParser {
    metric_name: String,
    field_name: String,
    value_type: ValueType,
    default_tags: BTreeMap<String, String>,
}

impl ValueParser {
    fn new(config: &ParserConfig) -> Result<Self, FormatError> {
        let value_type = match config.data_type.as_str() {
            "integer" => ValueType::Integer,
            "" | "float" => ValueType::Float,
            "string" => ValueType::String,
            "boolean" => ValueType::Boolean,
            other => {
                return Err(FormatError::InvalidConfig {
                    format: "value",
                    reason: format!("unsupported data_type '{other}'"),
                });
            }
        };
        Ok(Self {
            metric_name: config.metric_name.clone(),
            field_name: if config.value_field_name.is_empty() {
                "value".to_string()
            } else {
                config.value_field_name.clone()
            },
            value_type,
            default_tags: config.default_tags.clone(),
        })
    }
}

impl Parser for ValueParser {
    fn parse(&self, buf: &[u8]) -> Result<Vec<Metric>, FormatError> {
        let text = String::from_utf8_lossy(buf);
        let Some(raw) = text.lines().map(str::trim).rfind(|line| !line.is_empty()) else {
            return Ok(Vec::new());
        };
        let invalid = || FormatError::parse("value", 1, format!("invalid value '{raw}'"));
        let value = match self.value_type {
            ValueType::Integer => FieldValue::Integer(raw.parse().map_err(|_| invalid())?),
            ValueType::Float => FieldValue::Float(raw.parse().map_err(|_| invalid())?),
            ValueType::String => FieldValue::String(raw.to_string()),
            ValueType::Boolean => FieldValue::Bool(raw.parse().map_err(|_| invalid())?),
        };
        Ok(vec![Metric::new(
            self.metric_name.clone(),
            self.default_tags.clone(),
            BTreeMap::from([(self.field_name.clone(), value)]),
            SystemTime::now(),
        )])
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn config(format: &str) -> ParserConfig {
        ParserConfig {
            data_format: format.to_string(),
            ..ParserConfig::for_plugin("file")
        }
    }

    #[test]
    fn defaults_to_influx() {
        let parser = new_parser(&ParserConfig::for_plugin("exec")).unwrap();
        let metrics = parser.parse(b"mem used=1i").unwrap();
        assert_eq!(metrics[0].name(), "mem");
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(matches!(
            new_parser(&config("xml")),
            Err(FormatError::UnknownFormat(name)) if name == "xml"
        ));
    }

    #[test]
    fn json_flattens_and_tags() {
        let mut config = config("json");
        config.tag_keys = vec!["host".to_string()];
        config.json_string_fields = vec!["state".to_string()];
        let parser = new_parser(&config).unwrap();
        let body = json!({"host": "a", "state": "ok", "ignored": "x", "disk": {"free": 10, "ro": false}});
        let metrics = parser.parse(body.to_string().as_bytes()).unwrap();

        assert_eq!(metrics.len(), 1);
        let metric = &metrics[0];
        assert_eq!(metric.name(), "file");
        assert_eq!(metric.tags()["host"], "a");
        assert_eq!(metric.fields()["state"], FieldValue::String("ok".into()));
        assert_eq!(metric.fields()["disk_free"], FieldValue::Float(10.0));
        assert_eq!(metric.fields()["disk_ro"], FieldValue::Bool(false));
        assert!(!metric.fields().contains_key("ignored"));
    }

    #[test]
    fn json_strictness() {
        let body = br#"[{"v": 1}, 3]"#;
        let strict = new_parser(&config("json")).unwrap();
        assert!(strict.parse(body).is_err());

        let mut lenient = config("json");
        lenient.json_strict = false;
        let lenient = new_parser(&lenient).unwrap();
        assert_eq!(lenient.parse(body).unwrap().len(), 1);
    }

    #[test]
    fn value_parser_types() {
        let mut config = config("value");
        config.data_type = "integer".to_string();
        let parser = new_parser(&config).unwrap();
        let metrics = parser.parse(b"1\n42\n").unwrap();
        assert_eq!(metrics[0].fields()["value"], FieldValue::Integer(42));
        assert!(parser.parse(b"4.2").is_err());

        config.data_type = "complex".to_string();
        assert!(new_parser(&config).is_err());
    }
}
