// Mutation plan client.
//
// One POST per instruction, bounded by the planning timeout. The returned
// plan is pruned to the scope index and then passed through the coverage
// heuristic. Nothing here touches the document, and nothing is retried.

mod coverage;

use std::time::{Duration, Instant};

use atelier_common::path::PathAddress;
use atelier_common::protocol::plan::{PlanRequest, PlanResponse};
use atelier_common::types::{MutationPlan, PlanTarget, ScopeMode};
use reqwest::Client;
use tracing::{debug, info, warn};

pub use coverage::apply_coverage;

use crate::config::EditorConfig;
use crate::error::{clip_body, PlanError};
use crate::scope::ScopeIndex;

/// Everything the planner needs for one instruction.
#[derive(Debug, Clone)]
pub struct PlanInput<'a> {
    pub instruction: &'a str,
    pub index: &'a ScopeIndex,
    /// Paths implicated by the focused UI element, if any.
    pub selection_hint: Option<Vec<PathAddress>>,
    pub scope_mode: ScopeMode,
}

/// A normalized plan plus bookkeeping about how it was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOutcome {
    pub plan: MutationPlan,
    pub plan_time_ms: u64,
    pub model: String,
    /// Paths added by the coverage heuristic.
    pub injected: Vec<PathAddress>,
    /// Planner targets discarded because the index does not contain them.
    pub dropped: Vec<PlanTarget>,
}

#[derive(Debug, Clone)]
pub struct PlanClient {
    client: Client,
    url: String,
    model: String,
    timeout: Duration,
}

impl PlanClient {
    pub fn new(url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self { client: Client::new(), url: url.into(), model: model.into(), timeout }
    }

    pub fn from_config(config: &EditorConfig) -> Self {
        Self::new(
            config.endpoints.plan_url.clone(),
            config.models.planner.clone(),
            config.plan_timeout(),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Request a plan. The timeout drops the in-flight request.
    pub async fn plan(&self, input: PlanInput<'_>) -> Result<PlanOutcome, PlanError> {
        let started = Instant::now();
        let request = PlanRequest {
            prompt: input.instruction.to_string(),
            index: input.index.entries().to_vec(),
            selection_hint: input.selection_hint,
            scope_mode: input.scope_mode,
            model: self.model.clone(),
        };
        debug!(url = %self.url, entries = request.index.len(), "requesting plan");

        let response = tokio::time::timeout(self.timeout, self.send(&request))
            .await
            .map_err(|_| PlanError::Timeout(self.timeout.as_millis() as u64))??;

        let mut plan = response.plan.ok_or_else(|| {
            PlanError::Malformed("successful response carries no plan".into())
        })?;

        let dropped = plan.retain_targets(|target| input.index.contains(&target.path));
        for target in &dropped {
            warn!(path = %target.path, "planner returned a path outside the scope index");
        }
        let injected = apply_coverage(input.instruction, &mut plan, input.index);

        let elapsed = started.elapsed().as_millis() as u64;
        let outcome = PlanOutcome {
            plan,
            plan_time_ms: response.plan_time_ms.unwrap_or(elapsed),
            model: response.model.unwrap_or_else(|| self.model.clone()),
            injected,
            dropped,
        };
        info!(
            targets = outcome.plan.len(),
            injected = outcome.injected.len(),
            dropped = outcome.dropped.len(),
            elapsed_ms = elapsed,
            "plan ready"
        );
        Ok(outcome)
    }

    async fn send(&self, request: &PlanRequest) -> Result<PlanResponse, PlanError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| PlanError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| PlanError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(PlanError::Status { status: status.as_u16(), body: clip_body(&body) });
        }

        let parsed: PlanResponse =
            serde_json::from_str(&body).map_err(|e| PlanError::Malformed(e.to_string()))?;
        if !parsed.success {
            let reason = parsed.error.unwrap_or_else(|| "planner reported failure".into());
            return Err(PlanError::Rejected(reason));
        }
        Ok(parsed)
    }
}
