use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::fields::FieldDescriptor;

/// A reconciled field value. Never null: absence is `""` or `[]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Single(String),
    Multi(Vec<String>),
}

impl FieldValue {
    /// The empty placeholder with the field's cardinality.
    pub fn empty_for(field: &FieldDescriptor) -> Self {
        if field.is_multi() {
            FieldValue::Multi(Vec::new())
        } else {
            FieldValue::Single(String::new())
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Single(s) => s.trim().is_empty(),
            FieldValue::Multi(v) => v.iter().all(|s| s.trim().is_empty()),
        }
    }

    /// Flatten to one string, joining list values with `sep`.
    pub fn joined(&self, sep: &str) -> String {
        match self {
            FieldValue::Single(s) => s.clone(),
            FieldValue::Multi(v) => v.join(sep),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Single(s) => serde_json::Value::String(s.clone()),
            FieldValue::Multi(v) => serde_json::Value::Array(
                v.iter()
                    .map(|s| serde_json::Value::String(s.clone()))
                    .collect(),
            ),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Single(s) => serializer.serialize_str(s),
            FieldValue::Multi(v) => v.serialize(serializer),
        }
    }
}

/// Field name → value, in field-context order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRecord {
    entries: Vec<(String, FieldValue)>,
}

impl MetadataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Insert or replace, keeping the original position on replace.
    pub fn set(&mut self, name: &str, value: FieldValue) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| k == name) {
            slot.1 = value;
        } else {
            self.entries.push((name.to_string(), value));
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}

impl Serialize for MetadataRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_in_place() {
        let mut record = MetadataRecord::new();
        record.set("a", FieldValue::Single("1".into()));
        record.set("b", FieldValue::Multi(vec![]));
        record.set("a", FieldValue::Single("2".into()));
        assert_eq!(record.keys().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(record.get("a"), Some(&FieldValue::Single("2".into())));
    }

    #[test]
    fn serializes_in_insertion_order() {
        let mut record = MetadataRecord::new();
        record.set("Title", FieldValue::Single("Report".into()));
        record.set(
            "Creator",
            FieldValue::Multi(vec!["Tax Faculty".into(), "ICAEW".into()]),
        );
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"Title":"Report","Creator":["Tax Faculty","ICAEW"]}"#);
    }

    #[test]
    fn whitespace_only_values_count_as_empty() {
        assert!(FieldValue::Single("  ".into()).is_empty());
        assert!(FieldValue::Multi(vec![" ".into()]).is_empty());
        assert!(!FieldValue::Multi(vec!["x".into()]).is_empty());
    }
}
