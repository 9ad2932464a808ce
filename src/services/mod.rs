use serde_json::{Map, Value};
use std::collections::BTreeMap;

// Period lifecycle and the inventory ledger
pub mod ledger;
pub mod periods;

// Usage variance engine, investigation workflow, reporting
pub mod variance;

// Tier-2 write path shared by POS and CSV ingestion
pub mod reconciliation;

// Multi-provider POS transformation
pub mod pos;

// CSV validate → transform pipeline
pub mod csv;

// Service factory for dependency injection
pub mod factory;

/// Provider- or calculation-specific extras stored in the JSON escape-hatch columns.
pub type AdditionalAttributes = BTreeMap<String, Value>;

/// `None` for an empty map so untouched rows keep a NULL column.
pub fn attributes_to_json(attributes: &AdditionalAttributes) -> Option<Value> {
    if attributes.is_empty() {
        return None;
    }
    Some(Value::Object(
        attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Map<String, Value>>(),
    ))
}

pub fn attributes_from_json(value: Option<&Value>) -> AdditionalAttributes {
    match value {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => AdditionalAttributes::new(),
    }
}
