//! Metrics flowing between plugins.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

/// Value of a single metric field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Unsigned(u64),
    Bool(bool),
    String(String),
}

impl FieldValue {
    /// Numeric view of the value; `None` for strings.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Unsigned(v) => Some(*v as f64),
            FieldValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            FieldValue::String(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Integer(v) => write!(f, "{v}"),
            FieldValue::Unsigned(v) => write!(f, "{v}"),
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::String(v) => f.write_str(v),
        }
    }
}

macro_rules! field_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl From<$ty> for FieldValue {
            fn from(value: $ty) -> Self {
                FieldValue::$variant(value.into())
            }
        }
    )*};
}

field_value_from! {
    f64 => Float,
    f32 => Float,
    i64 => Integer,
    i32 => Integer,
    u64 => Unsigned,
    u32 => Unsigned,
    bool => Bool,
    String => String,
    &str => String,
}

/// A named measurement with tags, fields and a timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    name: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    time: SystemTime,
}

impl Metric {
    pub fn new(
        name: impl Into<String>,
        tags: BTreeMap<String, String>,
        fields: BTreeMap<String, FieldValue>,
        time: SystemTime,
    ) -> Self {
        Self {
            name: name.into(),
            tags,
            fields,
            time,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn tags_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.tags
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut BTreeMap<String, FieldValue> {
        &mut self.fields
    }

    pub fn time(&self) -> SystemTime {
        self.time
    }

    /// Adds a tag unless one with the same key is already present.
    pub fn add_tag_if_absent(&mut self, key: &str, value: &str) {
        if !self.tags.contains_key(key) {
            self.tags.insert(key.to_string(), value.to_string());
        }
    }

    /// Nanoseconds since the Unix epoch, negative before it.
    pub fn unix_nanos(&self) -> i64 {
        match self.time.duration_since(SystemTime::UNIX_EPOCH) {
            Ok(since) => i64::try_from(since.as_nanos()).unwrap_or(i64::MAX),
            Err(err) => -i64::try_from(err.duration().as_nanos()).unwrap_or(i64::MAX),
        }
    }
}

/// Collects metrics produced by a plugin call.
#[derive(Debug, Default)]
pub struct Accumulator {
    metrics: Vec<Metric>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a metric stamped with the current time.
    pub fn add_fields<K, V>(
        &mut self,
        name: &str,
        fields: impl IntoIterator<Item = (K, V)>,
        tags: BTreeMap<String, String>,
    ) where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        let fields: BTreeMap<String, FieldValue> = fields
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        if fields.is_empty() {
            return;
        }
        self.metrics
            .push(Metric::new(name, tags, fields, SystemTime::now()));
    }

    pub fn add_metric(&mut self, metric: Metric) {
        self.metrics.push(metric);
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn into_metrics(self) -> Vec<Metric> {
        self.metrics
    }
}
