// Loose structural check for design documents.
//
// Only the recognized top-level groups are type-checked. Everything else,
// including unknown keys nested inside recognized groups, passes through
// untouched.

use serde_json::Value;
use thiserror::Error;

/// Key of the envelope some document endpoints wrap the tree in.
pub const DOCUMENT_ENVELOPE_KEY: &str = "designV2";

/// Top-level groups that, when present, must be objects.
pub const RECOGNIZED_GROUPS: &[&str] = &["colors", "typography", "buttons", "sections"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("document root must be an object, found {0}")]
    RootNotObject(&'static str),

    #[error("`{field}` must be an object, found {found}")]
    GroupNotObject { field: String, found: &'static str },

    #[error("document contains none of the recognized groups ({})", RECOGNIZED_GROUPS.join(", "))]
    NoRecognizedGroups,
}

/// Strip a `{ "designV2": { .. } }` envelope if present.
pub fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.get(DOCUMENT_ENVELOPE_KEY).is_some_and(Value::is_object) => {
            map.remove(DOCUMENT_ENVELOPE_KEY).unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Validate the partial schema without modifying the document.
pub fn validate_document(doc: &Value) -> Result<(), SchemaError> {
    let root = doc.as_object().ok_or_else(|| SchemaError::RootNotObject(json_kind(doc)))?;

    let mut recognized = 0usize;
    for group in RECOGNIZED_GROUPS {
        let Some(value) = root.get(*group) else {
            continue;
        };
        if !value.is_object() {
            return Err(SchemaError::GroupNotObject {
                field: (*group).to_string(),
                found: json_kind(value),
            });
        }
        recognized += 1;
    }

    if recognized == 0 {
        return Err(SchemaError::NoRecognizedGroups);
    }

    if let Some(sections) = root.get("sections").and_then(Value::as_object) {
        for (name, section) in sections {
            if !section.is_object() {
                return Err(SchemaError::GroupNotObject {
                    field: format!("sections.{name}"),
                    found: json_kind(section),
                });
            }
        }
    }

    Ok(())
}

/// Unwrap and validate a raw response body into a working document.
pub fn parse_document(body: Value) -> Result<Value, SchemaError> {
    let doc = unwrap_envelope(body);
    validate_document(&doc)?;
    Ok(doc)
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
