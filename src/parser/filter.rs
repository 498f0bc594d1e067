//! Scenario-scoped field filtering (§3 field-filter invariant, §4.1 step 5).

use std::collections::BTreeMap;

use crate::types::{is_field_allowed, FieldValue};

/// Split extracted entities into the accepted subset (keys in the
/// scenario's declared field order or the common set) and the rejected
/// keys, which must be logged rather than silently dropped (§3).
pub fn filter_fields(
    entities: BTreeMap<String, FieldValue>,
    field_order: &[String],
) -> (BTreeMap<String, FieldValue>, Vec<String>) {
    let mut accepted = BTreeMap::new();
    let mut rejected = Vec::new();
    for (key, value) in entities {
        if is_field_allowed(&key, field_order) {
            accepted.insert(key, value);
        } else {
            rejected.push(key);
        }
    }
    (accepted, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_keys_outside_declared_set_and_common() {
        let field_order = vec!["fluid_type".to_string()];
        let mut entities = BTreeMap::new();
        entities.insert("fluid_type".to_string(), FieldValue::Text("FUEL".to_string()));
        entities.insert("flight_no".to_string(), FieldValue::Text("CCA1234".to_string()));
        entities.insert("unrelated_field".to_string(), FieldValue::Text("x".to_string()));

        let (accepted, rejected) = filter_fields(entities, &field_order);
        assert!(accepted.contains_key("fluid_type"));
        assert!(accepted.contains_key("flight_no"));
        assert_eq!(rejected, vec!["unrelated_field".to_string()]);
    }
}
