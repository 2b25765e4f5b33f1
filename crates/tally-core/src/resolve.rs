//! Field resolution by external name.

use crate::descriptor::{ConfigValue, Configurable, FieldDescriptor, ObjectDescriptor, Shape};

/// Outcome of resolving an external name on a live object.
pub enum Resolved<'a> {
    /// A writable slot.
    Slot {
        field: &'static FieldDescriptor,
        value: &'a mut dyn ConfigValue,
    },
    /// The field exists but is not public.
    Unsettable(&'static FieldDescriptor),
    /// Nothing answers to the name.
    NotFound,
}

/// Location of a field below an object, as a chain of field indices.
#[derive(Debug, Clone)]
pub struct Route {
    /// Indices from the outermost object inwards; embedded objects add one
    /// step each.
    pub indices: Vec<usize>,
    pub field: &'static FieldDescriptor,
}

/// Finds the field answering to `name` using only static descriptors.
///
/// Fields are visited in declaration order. An embedded field is searched
/// first and only then compared by its own name. Private embedded fields
/// are not searched, matching schema derivation and extraction.
pub fn locate(descriptor: &'static ObjectDescriptor, name: &str) -> Option<Route> {
    let mut indices = Vec::new();
    let field = locate_into(descriptor, name, &mut indices)?;
    Some(Route { indices, field })
}

fn locate_into(
    descriptor: &'static ObjectDescriptor,
    name: &str,
    indices: &mut Vec<usize>,
) -> Option<&'static FieldDescriptor> {
    for (index, field) in descriptor.fields.iter().enumerate() {
        indices.push(index);
        if field.embedded
            && field.visible
            && let Shape::Object(inner) = (field.shape)()
            && let Some(found) = locate_into(inner, name, indices)
        {
            return Some(found);
        }
        if field.answers_to(name) {
            return Some(field);
        }
        indices.pop();
    }
    None
}

/// Resolves `name` to a slot on `dest`.
pub fn resolve<'a, C>(dest: &'a mut C, name: &str) -> Resolved<'a>
where
    C: Configurable + ?Sized,
{
    let Some(route) = locate(dest.descriptor(), name) else {
        return Resolved::NotFound;
    };
    if !route.field.visible {
        return Resolved::Unsettable(route.field);
    }
    let Some((&last, parents)) = route.indices.split_last() else {
        return Resolved::NotFound;
    };

    let slot = match parents.split_first() {
        None => dest.field_mut(last),
        Some((&first, rest)) => {
            let mut current = dest.field_mut(first).and_then(|v| v.as_configurable_mut());
            for &index in rest {
                current = current
                    .and_then(|object| object.field_mut(index))
                    .and_then(|v| v.as_configurable_mut());
            }
            current.and_then(|object| object.field_mut(last))
        }
    };

    match slot {
        Some(value) => Resolved::Slot {
            field: route.field,
            value,
        },
        // An embedded parent that is not publicly writable.
        None => Resolved::Unsettable(route.field),
    }
}
