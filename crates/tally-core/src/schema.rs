//! Schema derivation.
//!
//! A schema describes every configurable field of a type: its external
//! name, a closed type tag, the default taken from the instance it was
//! derived from, and the nested structure of objects and collections.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use crate::descriptor::{Configurable, FieldDescriptor, Shape};
use crate::error::{SchemaError, SchemaResult};

/// Type tag of a schema entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Bool,
    Duration,
    Size,
    Any,
    Array,
    Map,
    Object,
    Unknown,
}

impl FieldType {
    /// Maps a shape to its tag; optional wrappers are transparent.
    pub fn of(shape: Shape) -> FieldType {
        match shape.resolved() {
            Shape::String => FieldType::String,
            Shape::Integer => FieldType::Integer,
            Shape::Float => FieldType::Float,
            Shape::Bool => FieldType::Bool,
            Shape::Duration => FieldType::Duration,
            Shape::Size => FieldType::Size,
            Shape::Any => FieldType::Any,
            Shape::Array(_) => FieldType::Array,
            Shape::Map(_) => FieldType::Map,
            Shape::Object(_) => FieldType::Object,
            Shape::Optional(_) | Shape::Unknown(_) => FieldType::Unknown,
        }
    }
}

/// Description of one configurable field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<FieldType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_fields: Option<BTreeMap<String, FieldSchema>>,
}

impl FieldSchema {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            default: None,
            format: None,
            required: false,
            sub_type: None,
            sub_fields: None,
        }
    }
}

/// Derives the schema of `instance`'s type.
///
/// Defaults are read from `instance`, so callers pass a freshly constructed
/// value. Any visible field whose kind has no schema representation fails
/// the whole derivation.
pub fn derive<C>(instance: &C) -> SchemaResult<BTreeMap<String, FieldSchema>>
where
    C: Configurable + ?Sized,
{
    let mut fields = BTreeMap::new();
    derive_into(instance, &mut fields)?;
    Ok(fields)
}

fn derive_into<C>(instance: &C, out: &mut BTreeMap<String, FieldSchema>) -> SchemaResult<()>
where
    C: Configurable + ?Sized,
{
    let descriptor = instance.descriptor();
    for (index, field) in descriptor.fields.iter().enumerate() {
        if !field.visible {
            continue;
        }
        let Some(name) = field.external_name() else {
            continue;
        };
        let value = instance.field(index);
        let shape = (field.shape)().resolved();

        if let Shape::Object(nested) = shape {
            let live = value.and_then(|v| v.as_configurable());
            let fresh;
            let object: &dyn Configurable = match live {
                Some(object) => object,
                None => {
                    fresh = (nested.construct)();
                    &*fresh
                }
            };
            if field.embedded {
                derive_into(object, out)?;
            } else {
                let mut schema = annotated(FieldSchema::new(FieldType::Object), field);
                schema.sub_type = Some(FieldType::Object);
                schema.sub_fields = Some(derive(object)?);
                out.insert(name.into_owned(), schema);
            }
            continue;
        }

        let field_type = checked_type(shape, descriptor.type_name, field)?;
        let mut schema = annotated(FieldSchema::new(field_type), field);
        if let Some(value) = value.filter(|v| !v.is_zero()) {
            schema.default = Some(value.snapshot());
        }
        if let Shape::Array(element) | Shape::Map(element) = shape {
            let element = element().resolved();
            schema.sub_type = Some(checked_type(element, descriptor.type_name, field)?);
            if let Shape::Object(nested) = element {
                schema.sub_fields = Some(derive(&*(nested.construct)())?);
            }
        }
        out.insert(name.into_owned(), schema);
    }
    Ok(())
}

fn annotated(mut schema: FieldSchema, field: &FieldDescriptor) -> FieldSchema {
    schema.format = field.format.map(str::to_string);
    schema.required = field.required;
    schema
}

fn checked_type(
    shape: Shape,
    type_name: &'static str,
    field: &'static FieldDescriptor,
) -> SchemaResult<FieldType> {
    match FieldType::of(shape) {
        FieldType::Unknown => {
            let err = SchemaError::UnrecognizedKind {
                type_name,
                field: field.ident,
                detail: shape.resolved().name(),
            };
            error!(%err, "Configuration type cannot be described");
            Err(err)
        }
        known => Ok(known),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;
    use crate::descriptor::{ConfigValue, Describe};
    use crate::error::BindError;
    use crate::{Configurable, Duration, Number, Size};

    #[derive(Debug, Default, Configurable)]
    struct Tls {
        pub ca: String,
        pub insecure: bool,
    }

    #[derive(Debug, Default, Configurable)]
    struct Header {
        pub key: String,
        pub value: String,
    }

    #[derive(Configurable)]
    struct Http {
        #[config(required, format = "url")]
        pub urls: Vec<String>,
        pub timeout: Duration,
        pub max_body: Size,
        pub ratio: Number,
        pub retries: Option<u8>,
        pub extra: Value,
        pub headers: Vec<Header>,
        pub tags: HashMap<String, String>,
        pub tls: Tls,
        pub proxy: Option<Tls>,
        #[config(flatten)]
        pub common: Common,
        #[config(skip)]
        pub skipped: String,
        pub hook: Option<Box<dyn Fn() + Send + Sync>>,
        #[allow(dead_code)]
        private: u8,
    }

    #[derive(Debug, Default, Configurable)]
    struct Common {
        pub alias: String,
    }

    impl Default for Http {
        fn default() -> Self {
            Self {
                urls: vec!["http://localhost".into()],
                timeout: Duration::from_secs(5),
                max_body: Size::ZERO,
                ratio: Number::default(),
                retries: None,
                extra: Value::Null,
                headers: Vec::new(),
                tags: HashMap::new(),
                tls: Tls {
                    ca: String::new(),
                    insecure: true,
                },
                proxy: None,
                common: Common::default(),
                skipped: String::new(),
                hook: None,
                private: 1,
            }
        }
    }

    #[test]
    fn describes_every_kind() {
        let schema = derive(&Http::default()).unwrap();
        let tags: Vec<(&str, FieldType)> = schema
            .iter()
            .map(|(name, field)| (name.as_str(), field.field_type))
            .collect();
        assert_eq!(
            tags,
            vec![
                ("alias", FieldType::String),
                ("extra", FieldType::Any),
                ("headers", FieldType::Array),
                ("max_body", FieldType::Size),
                ("proxy", FieldType::Object),
                ("ratio", FieldType::Float),
                ("retries", FieldType::Integer),
                ("tags", FieldType::Map),
                ("timeout", FieldType::Duration),
                ("tls", FieldType::Object),
                ("urls", FieldType::Array),
            ]
        );
    }

    #[test]
    fn defaults_and_annotations() {
        let schema = derive(&Http::default()).unwrap();
        assert_eq!(schema["timeout"].default, Some(json!("5s")));
        assert_eq!(schema["max_body"].default, None);
        assert_eq!(schema["urls"].default, Some(json!(["http://localhost"])));
        assert!(schema["urls"].required);
        assert_eq!(schema["urls"].format.as_deref(), Some("url"));
        assert_eq!(schema["urls"].sub_type, Some(FieldType::String));
        assert_eq!(schema["tags"].sub_type, Some(FieldType::String));
    }

    #[test]
    fn nested_objects() {
        let schema = derive(&Http::default()).unwrap();
        assert_eq!(schema["tls"].field_type, FieldType::Object);
        assert_eq!(schema["tls"].sub_type, Some(FieldType::Object));
        let tls = schema["tls"].sub_fields.as_ref().unwrap();
        assert_eq!(tls["insecure"].default, Some(json!(true)));
        assert_eq!(tls["ca"].field_type, FieldType::String);

        let proxy = schema["proxy"].sub_fields.as_ref().unwrap();
        assert_eq!(proxy["insecure"].default, None);

        let headers = &schema["headers"];
        assert_eq!(headers.sub_type, Some(FieldType::Object));
        let header_fields = headers.sub_fields.as_ref().unwrap();
        assert_eq!(header_fields.len(), 2);
    }

    #[test]
    fn wire_shape_omits_unset_members() {
        let schema = derive(&Http::default()).unwrap();
        let encoded = serde_json::to_value(&schema["ratio"]).unwrap();
        assert_eq!(encoded, json!({"type": "float"}));
        let encoded = serde_json::to_value(&schema["headers"]).unwrap();
        assert_eq!(encoded["sub_type"], json!("object"));
        assert!(encoded.get("default").is_none());
    }

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

    impl Default for Opaque {
        fn default() -> Self {
            Opaque
        }
    }

    #[derive(Default, Configurable)]
    struct Broken {
        pub fine: bool,
        pub opaque: Opaque,
    }

    #[test]
    fn unrecognized_kind_is_an_error() {
        let err = derive(&Broken::default()).unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnrecognizedKind {
                type_name: "Broken",
                field: "opaque",
                detail: "Opaque",
            }
        );
    }
}
