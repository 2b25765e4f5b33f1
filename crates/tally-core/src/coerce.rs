//! Coercion of untyped values into typed slots.
//!
//! Each destination kind implements [`ConfigValue::assign`] with the rules
//! for the sources it accepts; every other pairing is a [`BindError`].

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use crate::descriptor::{ConfigValue, Configurable, Describe, Shape};
use crate::error::{BindError, BindErrorKind};
use crate::scalar::{Duration, Number, Size};

// ─── Scalars ────────────────────────────────────────────────────────────────

impl Describe for bool {
    fn shape() -> Shape {
        Shape::Bool
    }
}

impl ConfigValue for bool {
    fn assign(&mut self, source: &Value) -> Result<(), BindError> {
        match source {
            Value::Bool(value) => {
                *self = *value;
                Ok(())
            }
            other => Err(BindError::mismatch("bool", other)),
        }
    }

    fn snapshot(&self) -> Value {
        Value::Bool(*self)
    }

    fn is_zero(&self) -> bool {
        !*self
    }
}

impl Describe for String {
    fn shape() -> Shape {
        Shape::String
    }
}

impl ConfigValue for String {
    fn assign(&mut self, source: &Value) -> Result<(), BindError> {
        match source {
            Value::String(value) => {
                self.clone_from(value);
                Ok(())
            }
            other => Err(BindError::mismatch("string", other)),
        }
    }

    fn snapshot(&self) -> Value {
        Value::String(self.clone())
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

macro_rules! impl_integer {
    ($($ty:ty),* $(,)?) => {$(
        impl Describe for $ty {
            fn shape() -> Shape {
                Shape::Integer
            }
        }

        impl ConfigValue for $ty {
            fn assign(&mut self, source: &Value) -> Result<(), BindError> {
                let Value::Number(number) = source else {
                    return Err(BindError::mismatch("integer", source));
                };
                let converted = if let Some(value) = number.as_i64() {
                    <$ty>::try_from(value).ok()
                } else if let Some(value) = number.as_u64() {
                    <$ty>::try_from(value).ok()
                } else {
                    return Err(BindError::mismatch("integer", source));
                };
                *self = converted.ok_or_else(|| {
                    BindError::new(BindErrorKind::OutOfRange {
                        value: number.to_string(),
                        target: stringify!($ty),
                    })
                })?;
                Ok(())
            }

            fn snapshot(&self) -> Value {
                Value::from(*self)
            }

            fn is_zero(&self) -> bool {
                *self == 0
            }
        }
    )*};
}

impl_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

/// Renders a float, using an integer when the value is integral so that
/// `1` binds and extracts as `1`.
fn float_value(value: f64) -> Value {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63
    if value.fract() == 0.0 && (-LIMIT..LIMIT).contains(&value) {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

macro_rules! impl_float {
    ($($ty:ty => $widen:expr),* $(,)?) => {$(
        impl Describe for $ty {
            fn shape() -> Shape {
                Shape::Float
            }
        }

        impl ConfigValue for $ty {
            fn assign(&mut self, source: &Value) -> Result<(), BindError> {
                match source.as_f64() {
                    Some(value) => {
                        *self = value as $ty;
                        Ok(())
                    }
                    None => Err(BindError::mismatch("float", source)),
                }
            }

            fn snapshot(&self) -> Value {
                let widen: fn($ty) -> f64 = $widen;
                float_value(widen(*self))
            }

            fn is_zero(&self) -> bool {
                *self == 0.0
            }
        }
    )*};
}

impl_float! {
    // shortest decimal form, so 0.1f32 stays 0.1
    f32 => |value| value.to_string().parse().unwrap_or(f64::from(value)),
    f64 => |value| value,
}

impl Describe for Number {
    fn shape() -> Shape {
        Shape::Float
    }
}

impl ConfigValue for Number {
    fn assign(&mut self, source: &Value) -> Result<(), BindError> {
        self.0.assign(source)
    }

    fn snapshot(&self) -> Value {
        float_value(self.0)
    }

    fn is_zero(&self) -> bool {
        self.0 == 0.0
    }
}

impl Describe for Duration {
    fn shape() -> Shape {
        Shape::Duration
    }
}

impl ConfigValue for Duration {
    fn assign(&mut self, source: &Value) -> Result<(), BindError> {
        match source {
            Value::String(text) => {
                *self = text.parse().map_err(BindError::new)?;
                Ok(())
            }
            other => Err(BindError::mismatch("duration", other)),
        }
    }

    fn snapshot(&self) -> Value {
        Value::String(self.to_string())
    }

    fn is_zero(&self) -> bool {
        Duration::is_zero(*self)
    }
}

impl Describe for Size {
    fn shape() -> Shape {
        Shape::Size
    }
}

impl ConfigValue for Size {
    fn assign(&mut self, source: &Value) -> Result<(), BindError> {
        match source {
            Value::String(text) => {
                *self = text.parse().map_err(BindError::new)?;
                Ok(())
            }
            other => Err(BindError::mismatch("size", other)),
        }
    }

    fn snapshot(&self) -> Value {
        Value::String(self.to_string())
    }

    fn is_zero(&self) -> bool {
        Size::is_zero(*self)
    }
}

impl Describe for Value {
    fn shape() -> Shape {
        Shape::Any
    }
}

impl ConfigValue for Value {
    fn assign(&mut self, source: &Value) -> Result<(), BindError> {
        self.clone_from(source);
        Ok(())
    }

    fn snapshot(&self) -> Value {
        self.clone()
    }

    fn is_zero(&self) -> bool {
        self.is_null()
    }
}

// ─── Containers ─────────────────────────────────────────────────────────────

impl<T: Describe> Describe for Option<T> {
    fn shape() -> Shape {
        Shape::Optional(T::shape)
    }
}

impl<T: ConfigValue + Default> ConfigValue for Option<T> {
    fn assign(&mut self, source: &Value) -> Result<(), BindError> {
        if source.is_null() {
            *self = None;
            return Ok(());
        }
        self.get_or_insert_with(T::default).assign(source)
    }

    fn snapshot(&self) -> Value {
        self.as_ref().map_or(Value::Null, ConfigValue::snapshot)
    }

    fn is_zero(&self) -> bool {
        self.is_none()
    }

    fn as_configurable(&self) -> Option<&dyn Configurable> {
        self.as_ref()?.as_configurable()
    }

    fn as_configurable_mut(&mut self) -> Option<&mut dyn Configurable> {
        self.as_mut()?.as_configurable_mut()
    }
}

impl<T: Describe> Describe for Vec<T> {
    fn shape() -> Shape {
        Shape::Array(T::shape)
    }
}

impl<T: ConfigValue + Default> ConfigValue for Vec<T> {
    fn assign(&mut self, source: &Value) -> Result<(), BindError> {
        let Value::Array(items) = source else {
            return Err(BindError::mismatch("array", source));
        };
        let mut fresh = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let mut element = T::default();
            element.assign(item).map_err(|err| err.at_index(index))?;
            fresh.push(element);
        }
        *self = fresh;
        Ok(())
    }

    fn snapshot(&self) -> Value {
        Value::Array(self.iter().map(ConfigValue::snapshot).collect())
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

fn assign_entries<T, C>(source: &Value) -> Result<C, BindError>
where
    T: ConfigValue + Default,
    C: FromIterator<(String, T)>,
{
    let Value::Object(entries) = source else {
        return Err(BindError::mismatch("map", source));
    };
    entries
        .iter()
        .map(|(key, item)| {
            let mut element = T::default();
            element.assign(item).map_err(|err| err.at_key(key.clone()))?;
            Ok((key.clone(), element))
        })
        .collect()
}

fn snapshot_entries<'a, T: ConfigValue + 'a>(
    entries: impl Iterator<Item = (&'a String, &'a T)>,
) -> Value {
    let map: Map<String, Value> = entries
        .map(|(key, value)| (key.clone(), value.snapshot()))
        .collect();
    Value::Object(map)
}

impl<T: Describe> Describe for BTreeMap<String, T> {
    fn shape() -> Shape {
        Shape::Map(T::shape)
    }
}

impl<T: ConfigValue + Default> ConfigValue for BTreeMap<String, T> {
    fn assign(&mut self, source: &Value) -> Result<(), BindError> {
        *self = assign_entries(source)?;
        Ok(())
    }

    fn snapshot(&self) -> Value {
        snapshot_entries(self.iter())
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Describe, S> Describe for HashMap<String, T, S> {
    fn shape() -> Shape {
        Shape::Map(T::shape)
    }
}

impl<T, S> ConfigValue for HashMap<String, T, S>
where
    T: ConfigValue + Default,
    S: std::hash::BuildHasher + Default + Send + Sync,
{
    fn assign(&mut self, source: &Value) -> Result<(), BindError> {
        *self = assign_entries(source)?;
        Ok(())
    }

    fn snapshot(&self) -> Value {
        snapshot_entries(self.iter())
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[test]
    fn integers_are_range_checked() {
        let mut small: u8 = 0;
        assert_ok!(small.assign(&json!(200)));
        assert_eq!(small, 200);
        let err = assert_err!(small.assign(&json!(300)));
        assert!(matches!(err.kind(), BindErrorKind::OutOfRange { target: "u8", .. }));
        assert_err!(small.assign(&json!(-1)));

        let mut wide: i64 = 0;
        assert_ok!(wide.assign(&json!(-5)));
        assert_eq!(wide, -5);
        assert_err!(wide.assign(&json!(u64::MAX)));
        assert_err!(wide.assign(&json!(1.5)));
    }

    #[test]
    fn floats_accept_integers() {
        let mut value = 0.0f64;
        assert_ok!(value.assign(&json!(3)));
        assert_eq!(value, 3.0);
        assert_ok!(value.assign(&json!(2.5)));
        assert_eq!(value, 2.5);
        assert_err!(value.assign(&json!("2.5")));

        let mut number = Number::default();
        assert_ok!(number.assign(&json!(7)));
        assert_eq!(number, Number(7.0));
    }

    #[test]
    fn integral_floats_snapshot_as_integers() {
        assert_eq!(3.0f64.snapshot(), json!(3));
        assert_eq!((-2.0f64).snapshot(), json!(-2));
        assert_eq!(2.5f64.snapshot(), json!(2.5));
        assert_eq!(1e300f64.snapshot(), json!(1e300));
        assert_eq!(f64::NAN.snapshot(), Value::Null);
        assert_eq!(Number(7.0).snapshot(), json!(7));

        assert_eq!(0.1f32.snapshot(), json!(0.1));
        assert_eq!(4.0f32.snapshot(), json!(4));
    }

    #[test]
    fn kinds_do_not_cross() {
        assert_err!(false.assign(&json!("true")));
        assert_err!(String::new().assign(&json!(1)));
        assert_err!(Duration::ZERO.assign(&json!(30)));
        assert_err!(Size::ZERO.assign(&json!(1024)));
    }

    #[test]
    fn duration_and_size_parse_text() {
        let mut timeout = Duration::ZERO;
        assert_ok!(timeout.assign(&json!("1h30m")));
        assert_eq!(timeout, Duration::from_mins(90));
        let err = assert_err!(timeout.assign(&json!("not-a-duration")));
        assert!(matches!(err.kind(), BindErrorKind::InvalidDuration(_)));

        let mut limit = Size::ZERO;
        assert_ok!(limit.assign(&json!("64MB")));
        assert_eq!(limit.as_bytes(), 64_000_000);
        assert_eq!(limit.snapshot(), json!("61MiB36KiB"));
    }

    #[test]
    fn optional_allocates_on_write() {
        let mut value: Option<u32> = None;
        assert_ok!(value.assign(&json!(4)));
        assert_eq!(value, Some(4));
        assert_ok!(value.assign(&Value::Null));
        assert_eq!(value, None);
    }

    #[test]
    fn sequences_are_rebuilt() {
        let mut names = vec!["stale".to_string(), "values".to_string()];
        assert_ok!(names.assign(&json!(["a"])));
        assert_eq!(names, vec!["a".to_string()]);

        let err = assert_err!(names.assign(&json!(["a", 2])));
        assert_eq!(err.path().to_string(), "[1]");
        assert_eq!(names, vec!["a".to_string()]);
    }

    #[test]
    fn maps_are_rebuilt() {
        let mut tags: BTreeMap<String, String> = BTreeMap::new();
        tags.insert("old".into(), "x".into());
        assert_ok!(tags.assign(&json!({"dc": "east"})));
        assert_eq!(tags.len(), 1);
        assert_eq!(tags["dc"], "east");

        let mut nested: HashMap<String, Vec<u16>> = HashMap::new();
        let err = assert_err!(nested.assign(&json!({"ports": [80, "443"]})));
        assert_eq!(err.path().to_string(), "ports[1]");
    }
}
