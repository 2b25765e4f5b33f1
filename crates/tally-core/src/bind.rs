//! Binding untyped field sets onto typed objects.

use serde_json::Value;
use tracing::trace;

use crate::FieldMap;
use crate::descriptor::Configurable;
use crate::error::{BindError, BindErrorKind};
use crate::resolve::{Resolved, resolve};

/// Applies `fields` onto `dest`.
///
/// Keys are processed in lexicographic order. Keys that no field answers to
/// are ignored; the first failing field aborts the bind and fields applied
/// before it keep their new values.
///
/// # Example
///
/// ```rust,ignore
/// let mut cpu = Cpu::default();
/// bind(&mut cpu, json!({"percpu": true}).as_object().unwrap())?;
/// ```
pub fn bind<C>(dest: &mut C, fields: &FieldMap) -> Result<(), BindError>
where
    C: Configurable + ?Sized,
{
    let type_name = dest.descriptor().type_name;
    let mut keys: Vec<&String> = fields.keys().collect();
    keys.sort_unstable();

    for key in keys {
        let source = &fields[key.as_str()];
        match resolve(dest, key) {
            Resolved::Slot { value, .. } => {
                value.assign(source).map_err(|err| err.at_key(key.as_str()))?;
            }
            Resolved::Unsettable(_) => {
                return Err(BindError::new(BindErrorKind::Unsettable).at_key(key.as_str()));
            }
            Resolved::NotFound => {
                trace!(type_name, field = %key, "Ignoring unknown field");
            }
        }
    }
    Ok(())
}

/// Binds a nested field set; used by generated [`ConfigValue`] impls.
///
/// [`ConfigValue`]: crate::ConfigValue
pub fn assign_object<C>(dest: &mut C, source: &Value) -> Result<(), BindError>
where
    C: Configurable + ?Sized,
{
    match source {
        Value::Object(fields) => bind(dest, fields),
        other => Err(BindError::mismatch("object", other)),
    }
}
