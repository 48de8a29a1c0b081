// Dot-separated addressing into schema-loose JSON documents.
//
// `get` never fails: a missing or non-container intermediate yields `None`.
// `set` materializes missing intermediates as empty objects but refuses to
// replace an existing scalar intermediate; overwrite only ever happens at the
// leaf the caller named.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Maximum number of segments in a single address.
const MAX_PATH_SEGMENTS: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path contains an empty segment: `{0}`")]
    EmptySegment(String),

    #[error("path exceeds maximum depth of {MAX_PATH_SEGMENTS} segments")]
    TooDeep,

    #[error("cannot descend through `{at}`: existing value is {found}")]
    NotAContainer { at: String, found: &'static str },

    #[error("array index `{index}` out of bounds at `{at}` (len {len})")]
    IndexOutOfBounds { at: String, index: usize, len: usize },
}

/// A validated dot-separated address such as `sections.hero.layout.padding`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathAddress {
    raw: String,
}

impl PathAddress {
    /// Parse and validate an address. Surrounding whitespace is trimmed.
    pub fn parse(input: &str) -> Result<Self, PathError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }

        let mut count = 0usize;
        for segment in trimmed.split('.') {
            if segment.trim().is_empty() {
                return Err(PathError::EmptySegment(trimmed.to_string()));
            }
            count += 1;
        }
        if count > MAX_PATH_SEGMENTS {
            return Err(PathError::TooDeep);
        }

        Ok(Self { raw: trimmed.to_string() })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.raw.split('.')
    }

    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Last segment of the address.
    pub fn leaf(&self) -> &str {
        self.raw.rsplit('.').next().unwrap_or(&self.raw)
    }

    /// Address of the containing subtree, or `None` at the top level.
    pub fn parent(&self) -> Option<Self> {
        self.raw.rsplit_once('.').map(|(head, _)| Self { raw: head.to_string() })
    }

    /// Append a single key to this address.
    pub fn child(&self, key: &str) -> Result<Self, PathError> {
        Self::parse(&format!("{}.{}", self.raw, key))
    }

    /// Segment-wise prefix test: `a.b` is an ancestor of `a.b.c` but not of `a.bc`.
    pub fn is_ancestor_of(&self, other: &PathAddress) -> bool {
        other.raw.len() > self.raw.len()
            && other.raw.starts_with(&self.raw)
            && other.raw.as_bytes()[self.raw.len()] == b'.'
    }

    /// True when the two addresses name the same node or one contains the other.
    pub fn overlaps(&self, other: &PathAddress) -> bool {
        self == other || self.is_ancestor_of(other) || other.is_ancestor_of(self)
    }
}

impl fmt::Display for PathAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for PathAddress {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PathAddress {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PathAddress> for String {
    fn from(value: PathAddress) -> Self {
        value.raw
    }
}

/// Resolve `path` against `doc`. Arrays are indexed by numeric segments.
pub fn get<'a>(doc: &'a Value, path: &PathAddress) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.segments() {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Mutable counterpart of [`get`].
pub fn get_mut<'a>(doc: &'a mut Value, path: &PathAddress) -> Option<&'a mut Value> {
    let mut current = doc;
    for segment in path.segments() {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write `value` at `path`, creating missing intermediate objects.
///
/// Sibling keys along the way are preserved. A `null` intermediate counts as
/// absent and is replaced by an empty object; any other scalar intermediate is
/// an error, as is a non-numeric segment into an array.
pub fn set(doc: &mut Value, path: &PathAddress, value: Value) -> Result<(), PathError> {
    if doc.is_null() {
        *doc = Value::Object(Map::new());
    }

    let segments: Vec<&str> = path.segments().collect();
    let (leaf, intermediates) = segments.split_last().ok_or(PathError::Empty)?;

    let mut current = doc;
    let mut walked = String::new();
    for segment in intermediates {
        push_segment(&mut walked, segment);
        current = descend_or_create(current, segment, &walked)?;
    }

    push_segment(&mut walked, leaf);
    match current {
        Value::Object(map) => {
            map.insert((*leaf).to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let len = items.len();
            let slot = leaf
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get_mut(index))
                .ok_or_else(|| PathError::IndexOutOfBounds {
                    at: walked.clone(),
                    index: leaf.parse::<usize>().unwrap_or(usize::MAX),
                    len,
                })?;
            *slot = value;
            Ok(())
        }
        other => Err(PathError::NotAContainer { at: walked, found: kind_name(other) }),
    }
}

/// Functional form of [`set`]: consumes the document and returns the updated one.
pub fn with_value(mut doc: Value, path: &PathAddress, value: Value) -> Result<Value, PathError> {
    set(&mut doc, path, value)?;
    Ok(doc)
}

/// Remove the node at `path`, returning it. Array elements are not removable.
pub fn remove(doc: &mut Value, path: &PathAddress) -> Option<Value> {
    let parent = match path.parent() {
        Some(parent) => get_mut(doc, &parent)?,
        None => doc,
    };
    parent.as_object_mut()?.remove(path.leaf())
}

/// Every leaf (non-object, or empty-object) address under `doc`, in key order.
pub fn leaf_paths(doc: &Value) -> Vec<PathAddress> {
    let mut out = Vec::new();
    if let Value::Object(map) = doc {
        for (key, child) in map {
            collect_leaves(child, key.clone(), &mut out);
        }
    }
    out
}

fn collect_leaves(value: &Value, prefix: String, out: &mut Vec<PathAddress>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                collect_leaves(child, format!("{prefix}.{key}"), out);
            }
        }
        _ => {
            if let Ok(path) = PathAddress::parse(&prefix) {
                out.push(path);
            }
        }
    }
}

fn descend_or_create<'a>(
    current: &'a mut Value,
    segment: &str,
    walked: &str,
) -> Result<&'a mut Value, PathError> {
    match current {
        Value::Object(map) => {
            let slot = map.entry(segment.to_string()).or_insert(Value::Null);
            if slot.is_null() {
                *slot = Value::Object(Map::new());
            }
            if slot.is_object() || slot.is_array() {
                Ok(slot)
            } else {
                Err(PathError::NotAContainer { at: walked.to_string(), found: kind_name(slot) })
            }
        }
        Value::Array(items) => {
            let len = items.len();
            let index = segment.parse::<usize>().map_err(|_| PathError::NotAContainer {
                at: walked.to_string(),
                found: "an array (non-numeric segment)",
            })?;
            items.get_mut(index).ok_or_else(|| PathError::IndexOutOfBounds {
                at: walked.to_string(),
                index,
                len,
            })
        }
        other => Err(PathError::NotAContainer { at: walked.to_string(), found: kind_name(other) }),
    }
}

fn push_segment(walked: &mut String, segment: &str) {
    if !walked.is_empty() {
        walked.push('.');
    }
    walked.push_str(segment);
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
