// Execution endpoint request body and streamed event types.
//
// The response body is newline-delimited JSON; each line is one
// `StreamEvent` discriminated by its `type` field.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::schema::RECOGNIZED_GROUPS;
use crate::types::MutationPlan;

/// Keys under which the executor may nest the merged candidate document.
pub const CANDIDATE_WRAPPER_KEYS: &[&str] = &["designV2", "document", "data"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecuteRequest {
    pub data: ExecuteData,
    pub prompt: String,
    pub model: String,
    #[serde(rename = "plannerOutput")]
    pub planner_output: MutationPlan,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecuteData {
    pub document: Value,
}

/// One chunk declared by the `plan` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlannedChunk {
    pub index: u32,
    pub path: String,
}

/// Run metadata attached to the terminal `result` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunMetadata {
    #[serde(
        rename = "plannerMs",
        alias = "planTimeMs",
        deserialize_with = "millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub planner_ms: Option<u64>,
    #[serde(rename = "plannerModel", skip_serializing_if = "Option::is_none")]
    pub planner_model: Option<String>,
    #[serde(
        rename = "executorMs",
        alias = "totalMs",
        deserialize_with = "millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub executor_ms: Option<u64>,
    #[serde(rename = "chunksPlanned", skip_serializing_if = "Option::is_none")]
    pub chunks_planned: Option<usize>,
    #[serde(rename = "chunksSucceeded", skip_serializing_if = "Option::is_none")]
    pub chunks_succeeded: Option<usize>,
    #[serde(rename = "chunksFailed", skip_serializing_if = "Option::is_none")]
    pub chunks_failed: Option<usize>,
}

/// Events carried on the execution stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Plan {
        #[serde(alias = "chunks", alias = "jobs")]
        paths: Vec<PlannedChunk>,
    },
    ChunkStart {
        index: u32,
    },
    ChunkComplete {
        index: u32,
        ok: bool,
        #[serde(default, deserialize_with = "millis")]
        ms: Option<u64>,
        #[serde(default)]
        error: Option<String>,
    },
    Result {
        success: bool,
        #[serde(rename = "enhancedData", default)]
        enhanced_data: Option<Value>,
        #[serde(default)]
        metadata: RunMetadata,
        #[serde(default)]
        error: Option<String>,
    },
    Error {
        message: String,
    },
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Plan { .. } => "plan",
            Self::ChunkStart { .. } => "chunk_start",
            Self::ChunkComplete { .. } => "chunk_complete",
            Self::Result { .. } => "result",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Result { .. } | Self::Error { .. })
    }
}

/// Durations arrive as arbitrary JSON numbers; fractional or negative values
/// are rounded and clamped rather than failing the whole event.
pub(crate) fn millis<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw.filter(|ms| ms.is_finite()).map(|ms| ms.max(0.0).round() as u64))
}

/// Event kinds whose loss would change the outcome of a run.
pub fn is_terminal_kind(kind: &str) -> bool {
    matches!(kind, "result" | "error")
}

/// Extract the merged document from one of the known result shapes.
///
/// The executor returns either the document itself or the document nested
/// one level under a wrapper key. A payload that already carries a recognized
/// top-level group is treated as the document. Returns `None` for non-object
/// payloads.
pub fn unwrap_candidate(enhanced: Value) -> Option<Value> {
    let Value::Object(mut map) = enhanced else {
        return None;
    };

    if RECOGNIZED_GROUPS.iter().any(|group| map.contains_key(*group)) {
        return Some(Value::Object(map));
    }

    for key in CANDIDATE_WRAPPER_KEYS {
        if map.get(*key).is_some_and(Value::is_object) {
            return map.remove(*key);
        }
    }

    Some(Value::Object(map))
}

/// Convenience for tests and mock servers: render events as an NDJSON body.
pub fn encode_lines(events: &[StreamEvent]) -> String {
    let mut out = String::new();
    for event in events {
        if let Ok(line) = serde_json::to_string(event) {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}
