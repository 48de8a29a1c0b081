// Immutable serialized copies of the working document.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// A document frozen at one moment: baseline on load/save, backup on preview.
///
/// Equality is by canonical serialization, so key order never makes a
/// document look dirty.
#[derive(Debug, Clone)]
pub struct Snapshot {
    value: Value,
    canonical: String,
    taken_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn capture(doc: &Value) -> Self {
        Self { value: doc.clone(), canonical: canonical_json(doc), taken_at: Utc::now() }
    }

    /// True when `doc` serializes identically to this snapshot.
    pub fn matches(&self, doc: &Value) -> bool {
        canonical_json(doc) == self.canonical
    }

    /// A fresh deep copy of the captured document.
    pub fn restore(&self) -> Value {
        self.value.clone()
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }
}

/// Serialize with object keys sorted at every depth.
pub fn canonical_json(doc: &Value) -> String {
    sorted(doc).to_string()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), sorted(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn key_order_does_not_affect_equality() {
        let a: Value = serde_json::from_str(r#"{"b":1,"a":{"y":2,"x":3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":{"x":3,"y":2},"b":1}"#).unwrap();
        assert!(Snapshot::capture(&a).matches(&b));
        assert_eq!(canonical_json(&a), r#"{"a":{"x":3,"y":2},"b":1}"#);
    }

    #[test]
    fn array_order_is_significant() {
        let snap = Snapshot::capture(&json!({ "list": [1, 2] }));
        assert!(!snap.matches(&json!({ "list": [2, 1] })));
    }

    #[test]
    fn restore_is_a_detached_copy() {
        let snap = Snapshot::capture(&json!({ "colors": { "primary": "#000" } }));
        let mut restored = snap.restore();
        restored["colors"]["primary"] = json!("#fff");
        assert_eq!(snap.restore()["colors"]["primary"], json!("#000"));
    }
}
