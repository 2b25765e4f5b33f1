//! Snapshots of live configuration objects.

use serde_json::Value;

use crate::FieldMap;
use crate::descriptor::Configurable;

/// Renders the current field values of `instance`.
///
/// Zero-valued fields are left out, embedded objects are flattened into the
/// current level and domain scalars render to their canonical text.
pub fn extract<C>(instance: &C) -> FieldMap
where
    C: Configurable + ?Sized,
{
    let mut out = FieldMap::new();
    extract_into(instance, &mut out);
    out
}

fn extract_into<C>(instance: &C, out: &mut FieldMap)
where
    C: Configurable + ?Sized,
{
    for (index, field) in instance.descriptor().fields.iter().enumerate() {
        if !field.visible {
            continue;
        }
        let Some(name) = field.external_name() else {
            continue;
        };
        let Some(value) = instance.field(index) else {
            continue;
        };
        if value.is_zero() {
            continue;
        }
        if field.embedded
            && let Some(object) = value.as_configurable()
        {
            extract_into(object, out);
            continue;
        }
        out.insert(name.into_owned(), value.snapshot());
    }
}

/// Zero check for structured objects: every described field is zero.
pub fn is_zero_object<C>(instance: &C) -> bool
where
    C: Configurable + ?Sized,
{
    (0..instance.descriptor().fields.len())
        .all(|index| instance.field(index).is_none_or(|value| value.is_zero()))
}

/// Snapshot of a structured object as an untyped value.
pub fn snapshot_object<C>(instance: &C) -> Value
where
    C: Configurable + ?Sized,
{
    Value::Object(extract(instance))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::bind::bind;
    use crate::schema::{FieldType, derive};
    use crate::{Configurable, Duration, Number, Size};

    #[derive(Debug, Default, Configurable)]
    struct Target {
        pub host: String,
        pub port: u16,
    }

    #[derive(Debug, Default, Configurable)]
    struct Identity {
        pub alias: String,
    }

    #[derive(Debug, Default, Configurable)]
    struct Scraper {
        #[config(flatten)]
        pub identity: Identity,
        pub interval: Duration,
        pub buffer: Size,
        pub enabled: bool,
        pub ratio: f64,
        pub weight: Number,
        pub targets: Vec<Target>,
        pub labels: BTreeMap<String, String>,
        pub primary: Target,
        pub backup: Option<Target>,
        pub counts: Vec<i64>,
        #[config(name = "token")]
        secret: String,
    }

    #[test]
    fn skips_zero_fields() {
        let scraper = Scraper::default();
        assert!(extract(&scraper).is_empty());
        assert!(is_zero_object(&scraper));
    }

    #[test]
    fn renders_scalars_canonically() {
        let scraper = Scraper {
            interval: Duration::from_mins(90),
            buffer: Size::from_mib(64),
            secret: "hunter2".into(),
            counts: vec![0, 3],
            ..Default::default()
        };
        let snapshot = extract(&scraper);
        assert_eq!(snapshot["interval"], json!("1h30m0s"));
        assert_eq!(snapshot["buffer"], json!("64MiB"));
        assert_eq!(snapshot["counts"], json!([0, 3]));
        assert!(!snapshot.contains_key("token"));
        assert!(!snapshot.contains_key("secret"));
    }

    #[test]
    fn round_trips_through_schema() {
        let schema = derive(&Scraper::default()).unwrap();
        assert_eq!(schema["alias"].field_type, FieldType::String);
        assert!(!schema.contains_key("identity"));

        let request = json!({
            "alias": "edge",
            "interval": "1h30m",
            "buffer": "1GiB512MiB",
            "enabled": true,
            "ratio": 0.25,
            "targets": [{"host": "a", "port": 80}, {"host": "b"}],
            "labels": {"dc": "east"},
            "primary": {"host": "p", "port": 9000},
            "backup": {"host": "q"},
            "counts": [1, 2],
        });
        let fields = request.as_object().unwrap();
        for key in fields.keys() {
            assert!(schema.contains_key(key), "{key} missing from schema");
        }

        let mut scraper = Scraper::default();
        bind(&mut scraper, fields).unwrap();
        let mut expected = fields.clone();
        expected.insert("interval".into(), json!("1h30m0s"));
        assert_eq!(extract(&scraper), expected);
    }

    #[test]
    fn round_trip_canonicalises_numbers_and_units() {
        let request = json!({
            "interval": "90m",
            "buffer": "1024KiB",
            "ratio": 1,
            "weight": 3,
            "targets": [{"host": "a", "port": 80}],
        });
        let fields = request.as_object().unwrap();

        let mut scraper = Scraper::default();
        bind(&mut scraper, fields).unwrap();
        assert_eq!(scraper.ratio, 1.0);
        assert_eq!(scraper.weight, Number(3.0));

        let mut expected = fields.clone();
        expected.insert("interval".into(), json!("1h30m0s"));
        expected.insert("buffer".into(), json!("1MiB"));
        assert_eq!(extract(&scraper), expected);

        let mut fractional = Scraper::default();
        bind(&mut fractional, json!({"weight": 2.5}).as_object().unwrap()).unwrap();
        assert_eq!(extract(&fractional)["weight"], json!(2.5));
    }
}
