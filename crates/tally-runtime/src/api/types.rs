//! Request and response shapes of the management API.
//!
//! All types serialize with `snake_case` member names; optional members are
//! left out when unset.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tally_core::{FieldMap, FieldSchema};
use tally_framework::PluginId;

/// A plugin type and the schema of its configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginTypeSchema {
    /// `category.name`, e.g. `inputs.cpu`.
    pub qualified_name: String,
    pub fields: BTreeMap<String, FieldSchema>,
}

/// Create or update request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginConfigRequest {
    /// Qualified plugin type name.
    pub type_name: String,
    #[serde(default)]
    pub fields: FieldMap,
}

impl PluginConfigRequest {
    pub fn new(type_name: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
        }
    }
}

/// A tracked instance and its current configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningPluginDescriptor {
    pub id: PluginId,
    /// `category.name`, suffixed with `::alias` when one is set.
    pub display_name: String,
    pub snapshot: FieldMap,
}

/// Record handed to add and remove hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginEvent {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "FieldMap::is_empty")]
    pub fields: FieldMap,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_wire_shape() {
        let request: PluginConfigRequest =
            serde_json::from_value(json!({"type_name": "inputs.cpu", "fields": {"percpu": true}}))
                .unwrap();
        assert_eq!(request.type_name, "inputs.cpu");
        assert_eq!(request.fields["percpu"], json!(true));

        let bare: PluginConfigRequest =
            serde_json::from_value(json!({"type_name": "outputs.discard"})).unwrap();
        assert!(bare.fields.is_empty());
    }

    #[test]
    fn event_omits_unset_members() {
        let event = PluginEvent {
            id: "00000000000000ff".into(),
            type_name: None,
            fields: FieldMap::new(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"id": "00000000000000ff"})
        );
    }
}
