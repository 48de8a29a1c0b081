// AI mutation pipeline: scope index -> plan -> streamed execution.
//
// At most one run is in flight per pipeline. The document is only read
// here; applying the result is the preview controller's job.

use std::sync::atomic::{AtomicBool, Ordering};

use atelier_common::jobs::Job;
use atelier_common::path::PathAddress;
use atelier_common::types::ScopeMode;
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

use crate::config::EditorConfig;
use crate::error::{EditorError, ExecError, PlanError};
use crate::exec::{CancelToken, ExecClient, ExecRequest, ExecutionOutcome};
use crate::plan::{PlanClient, PlanInput, PlanOutcome};
use crate::scope::ScopeIndex;
use crate::store::DocumentStore;

#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub instruction: String,
    pub selection_hint: Option<Vec<PathAddress>>,
    pub scope_mode: ScopeMode,
    /// Executor model override for this run.
    pub executor_model: Option<String>,
}

impl RunRequest {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self { instruction: instruction.into(), ..Self::default() }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub plan: PlanOutcome,
    pub execution: ExecutionOutcome,
}

pub struct MutationPipeline {
    planner: PlanClient,
    executor: ExecClient,
    in_flight: AtomicBool,
    progress: Option<UnboundedSender<Job>>,
}

/// Clears the in-flight flag when the run ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).ok()?;
        Some(Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl MutationPipeline {
    pub fn new(planner: PlanClient, executor: ExecClient) -> Self {
        Self { planner, executor, in_flight: AtomicBool::new(false), progress: None }
    }

    pub fn from_config(config: &EditorConfig) -> Self {
        Self::new(PlanClient::from_config(config), ExecClient::from_config(config))
    }

    /// Forward every job state change of later runs to `progress`.
    pub fn with_progress(mut self, progress: UnboundedSender<Job>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Plan and execute `request` against the store's current document.
    ///
    /// Returns `EditorError::Busy` if another run is in flight. The store is
    /// never modified.
    pub async fn run(
        &self,
        store: &DocumentStore,
        request: RunRequest,
        mut cancel: CancelToken,
    ) -> Result<PipelineOutcome, EditorError> {
        let _guard = InFlightGuard::acquire(&self.in_flight).ok_or(EditorError::Busy)?;

        let document = store.current_document()?;
        let index = ScopeIndex::build(&document);
        info!(entries = index.len(), "scope index built");

        let input = PlanInput {
            instruction: &request.instruction,
            index: &index,
            selection_hint: request.selection_hint.clone(),
            scope_mode: request.scope_mode,
        };
        let plan = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ExecError::Cancelled { jobs: Vec::new() }.into());
            }
            plan = self.planner.plan(input) => plan?,
        };
        if plan.plan.is_empty() {
            return Err(PlanError::EmptyPlan.into());
        }

        let exec_request = ExecRequest {
            document: &document,
            instruction: &request.instruction,
            plan: &plan.plan,
            model: request.executor_model.as_deref(),
        };
        let mut execution =
            self.executor.execute(exec_request, cancel, self.progress.clone()).await?;
        // The executor's metadata wins; the planner's own reply fills the gaps.
        let summary = &mut execution.summary;
        summary.planner_ms.get_or_insert(plan.plan_time_ms);
        if summary.planner_model.is_none() {
            summary.planner_model = Some(plan.model.clone());
        }
        Ok(PipelineOutcome { plan, execution })
    }
}
