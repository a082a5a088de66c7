//! Subnet role mapping published by the subnet stage.

use serde_json::{Map, Value};

use crate::error::{ProvisionError, ProvisionResult};

/// Output of the subnet stage that maps roles to subnet ids.
pub const SUBNET_IDS_OUTPUT: &str = "subnet_ids_by_key";

/// Logical subnet role → subnet id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubnetMap(Map<String, Value>);

impl SubnetMap {
    /// Build from an output value.
    ///
    /// Accepts a JSON object, or a string containing one (as read back from
    /// older state or stringified outputs).
    pub fn from_value(value: Value) -> ProvisionResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => Ok(Self(map)),
                _ => Err(ProvisionError::InvalidSubnetMap(raw)),
            },
            other => Err(ProvisionError::InvalidSubnetMap(other.to_string())),
        }
    }

    /// Non-empty subnet id for a role.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Subnet id for a single role; fails naming the key when absent.
    pub fn subnet_id(&self, key: &str, label: &str) -> ProvisionResult<String> {
        select_subnet_ids(self, &[key], label).map(|mut ids| ids.remove(0))
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// Select subnet ids for the given roles, in order.
///
/// Every missing role is reported in one error.
pub fn select_subnet_ids<S: AsRef<str>>(
    mapping: &SubnetMap,
    keys: &[S],
    label: &str,
) -> ProvisionResult<Vec<String>> {
    let mut selected = Vec::with_capacity(keys.len());
    let mut missing = Vec::new();
    for key in keys {
        let key = key.as_ref();
        match mapping.get(key) {
            Some(id) => selected.push(id.to_string()),
            None => missing.push(key.to_string()),
        }
    }
    if missing.is_empty() {
        Ok(selected)
    } else {
        Err(ProvisionError::MissingSubnet {
            label: label.to_string(),
            keys: missing.join(", "),
        })
    }
}
