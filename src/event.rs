//! Events and their dictionary-encoded form.
//!
//! An event is an attribute bag: possibly-nested maps of scalars and arrays.
//! Encoding flattens nested maps into dotted UPPER_SNAKE_CASE keys, interns
//! string values (case-folded) against a frozen model dictionary, and keeps
//! the original string alongside so regex predicates see unfolded input.
//!
//! The same event may be evaluated against different models, so the encoded
//! form is derived per evaluation and never cached on the event itself.
//! Fields unknown to the model's dictionary are omitted from the encoded
//! form rather than encoded with a sentinel.

use crate::dictionary::{fold_value, normalize_field_name, Dictionary};
use crate::error::{HeliosError, HeliosResult};
use crate::predicate::FieldId;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::sync::Arc;

/// An input record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_id: String,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl Event {
    pub fn new(event_id: impl Into<String>) -> Self {
        Event {
            event_id: event_id.into(),
            event_type: String::new(),
            attributes: serde_json::Map::new(),
        }
    }

    /// Builder-style attribute insertion, mostly for tests and examples.
    pub fn with_attribute(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Reject events the evaluator must not touch: blank `eventId`.
    pub fn validate(&self) -> HeliosResult<()> {
        if self.event_id.trim().is_empty() {
            return Err(HeliosError::InvalidEvent(
                "eventId must be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// A single encoded attribute value.
#[derive(Debug, Clone)]
pub enum EncodedValue {
    /// String attribute. `value_id` is present only when the folded text is
    /// in the model's value dictionary; unknown strings still participate in
    /// CONTAINS/REGEX evaluation through `folded`/`original`.
    Text {
        value_id: Option<u32>,
        folded: Arc<str>,
        original: Arc<str>,
    },
    Number(f64),
    Bool(bool),
}

/// Values observed for one field. Usually a single value; array attributes
/// produce several, and a predicate over the field is true if any element
/// satisfies it.
pub type FieldValues = SmallVec<[EncodedValue; 1]>;

/// An event after flattening and dictionary encoding, sorted by field ID.
#[derive(Debug, Clone, Default)]
pub struct EncodedEvent {
    fields: Vec<(FieldId, FieldValues)>,
}

impl EncodedEvent {
    /// Flatten and encode `event` against a model's frozen dictionaries.
    ///
    /// Attribute keys unknown to `field_dict` are omitted. Null values and
    /// non-scalar array elements are skipped.
    pub fn encode(event: &Event, field_dict: &Dictionary, value_dict: &Dictionary) -> Self {
        let mut fields: Vec<(FieldId, FieldValues)> = Vec::with_capacity(event.attributes.len());
        let mut path = String::new();
        for (key, value) in &event.attributes {
            flatten_into(&mut fields, &mut path, key, value, field_dict, value_dict);
        }
        fields.sort_unstable_by_key(|(id, _)| *id);
        // Arrays of maps can produce the same field twice; merge adjacent runs.
        fields.dedup_by(|b, a| {
            if a.0 == b.0 {
                a.1.append(&mut b.1);
                true
            } else {
                false
            }
        });
        EncodedEvent { fields }
    }

    pub fn get(&self, field: FieldId) -> Option<&FieldValues> {
        self.fields
            .binary_search_by_key(&field, |(id, _)| *id)
            .ok()
            .map(|idx| &self.fields[idx].1)
    }

    /// Present fields in ascending field-ID order.
    pub fn iter(&self) -> impl Iterator<Item = (FieldId, &FieldValues)> {
        self.fields.iter().map(|(id, values)| (*id, values))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn flatten_into(
    out: &mut Vec<(FieldId, FieldValues)>,
    path: &mut String,
    key: &str,
    value: &serde_json::Value,
    field_dict: &Dictionary,
    value_dict: &Dictionary,
) {
    let saved_len = path.len();
    if !path.is_empty() {
        path.push('.');
    }
    path.push_str(&normalize_field_name(key));

    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                flatten_into(out, path, k, v, field_dict, value_dict);
            }
        }
        serde_json::Value::Array(items) => {
            if let Some(field) = field_dict.lookup(path) {
                let mut values = FieldValues::new();
                for item in items {
                    if let Some(encoded) = encode_scalar(item, value_dict) {
                        values.push(encoded);
                    }
                }
                if !values.is_empty() {
                    out.push((field, values));
                }
            }
        }
        serde_json::Value::Null => {}
        scalar => {
            if let Some(field) = field_dict.lookup(path) {
                if let Some(encoded) = encode_scalar(scalar, value_dict) {
                    out.push((field, smallvec::smallvec![encoded]));
                }
            }
        }
    }

    path.truncate(saved_len);
}

fn encode_scalar(value: &serde_json::Value, value_dict: &Dictionary) -> Option<EncodedValue> {
    match value {
        serde_json::Value::String(s) => {
            let folded = fold_value(s);
            let value_id = value_dict.lookup(&folded);
            Some(EncodedValue::Text {
                value_id,
                folded: Arc::from(folded.as_str()),
                original: Arc::from(s.as_str()),
            })
        }
        serde_json::Value::Number(n) => n.as_f64().map(EncodedValue::Number),
        serde_json::Value::Bool(b) => Some(EncodedValue::Bool(*b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dicts() -> (Dictionary, Dictionary) {
        let mut fields = Dictionary::new();
        fields.encode("STATUS");
        fields.encode("AMOUNT");
        fields.encode("USER.PROFILE.TIER");
        fields.encode("TAGS");
        let mut values = Dictionary::new();
        values.encode("ACTIVE");
        values.encode("GOLD");
        (fields, values)
    }

    #[test]
    fn test_flatten_and_fold() {
        let (fields, values) = dicts();
        let event = Event::new("e1")
            .with_attribute("status", "Active")
            .with_attribute("amount", 200);
        let encoded = EncodedEvent::encode(&event, &fields, &values);

        let status = &encoded.get(0).unwrap()[0];
        match status {
            EncodedValue::Text {
                value_id,
                folded,
                original,
            } => {
                assert_eq!(*value_id, Some(0));
                assert_eq!(&**folded, "ACTIVE");
                assert_eq!(&**original, "Active");
            }
            other => panic!("expected text, got {:?}", other),
        }
        match &encoded.get(1).unwrap()[0] {
            EncodedValue::Number(n) => assert_eq!(*n, 200.0),
            other => panic!("expected number, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_keys_join_with_dots() {
        let (fields, values) = dicts();
        let event =
            Event::new("e1").with_attribute("user", json!({"profile": {"tier": "gold"}}));
        let encoded = EncodedEvent::encode(&event, &fields, &values);
        let tier = encoded.get(2).expect("USER.PROFILE.TIER present");
        match &tier[0] {
            EncodedValue::Text { value_id, .. } => assert_eq!(*value_id, Some(1)),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_fields_are_omitted() {
        let (fields, values) = dicts();
        let event = Event::new("e1").with_attribute("nonexistent", "x");
        let encoded = EncodedEvent::encode(&event, &fields, &values);
        assert!(encoded.is_empty());
    }

    #[test]
    fn test_unknown_string_value_keeps_text() {
        let (fields, values) = dicts();
        let event = Event::new("e1").with_attribute("status", "Dormant");
        let encoded = EncodedEvent::encode(&event, &fields, &values);
        match &encoded.get(0).unwrap()[0] {
            EncodedValue::Text { value_id, folded, .. } => {
                assert_eq!(*value_id, None);
                assert_eq!(&**folded, "DORMANT");
            }
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_array_attribute_is_multi_valued() {
        let (fields, values) = dicts();
        let event = Event::new("e1").with_attribute("tags", json!(["gold", "new"]));
        let encoded = EncodedEvent::encode(&event, &fields, &values);
        assert_eq!(encoded.get(3).unwrap().len(), 2);
    }

    #[test]
    fn test_hyphens_and_case_normalize() {
        let mut fields = Dictionary::new();
        fields.encode("USER_ID");
        let values = Dictionary::new();
        let event = Event::new("e1").with_attribute("User-Id", "u7");
        let encoded = EncodedEvent::encode(&event, &fields, &values);
        assert!(encoded.get(0).is_some());
    }

    #[test]
    fn test_blank_event_id_rejected() {
        let event = Event::new("  ");
        assert!(event.validate().is_err());
    }
}
