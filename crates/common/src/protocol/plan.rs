// Planning endpoint request/response bodies.

use serde::{Deserialize, Serialize};

use super::execute::millis;
use crate::path::PathAddress;
use crate::types::{MutationPlan, ScopeIndexEntry, ScopeMode};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanRequest {
    pub prompt: String,
    pub index: Vec<ScopeIndexEntry>,
    #[serde(rename = "selectionHint", default, skip_serializing_if = "Option::is_none")]
    pub selection_hint: Option<Vec<PathAddress>>,
    #[serde(rename = "scopeMode")]
    pub scope_mode: ScopeMode,
    pub model: String,
}

/// Success or error envelope returned by the planner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanResponse {
    pub success: bool,
    #[serde(default)]
    pub plan: Option<MutationPlan>,
    #[serde(rename = "planTimeMs", default, deserialize_with = "millis")]
    pub plan_time_ms: Option<u64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
