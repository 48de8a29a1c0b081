// Per-chunk job state machine for streamed execution runs.
//
// Jobs are keyed by their plan index, never by arrival position: the executor
// may complete chunks in any order. Each job only ever moves forward through
// pending -> running -> {ok | error}; a terminal job never changes again.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::execute::RunMetadata;

/// Error prefix marking an intentionally omitted path rather than a defect.
pub const SKIP_PREFIX: &str = "skip:";
/// Error recorded on jobs forced terminal by cancellation.
pub const CANCELLED_REASON: &str = "cancelled";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Ok,
    Error,
}

impl JobStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Ok | Self::Error => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ok | Self::Error)
    }
}

/// How a terminal job is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Job {
    pub index: u32,
    pub path: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn pending(index: u32, path: impl Into<String>) -> Self {
        Self {
            index,
            path: path.into(),
            status: JobStatus::Pending,
            ms: None,
            error: None,
            started_at: None,
        }
    }

    /// `None` while the job has not reached a terminal state.
    pub fn outcome(&self) -> Option<JobOutcome> {
        match self.status {
            JobStatus::Ok => Some(JobOutcome::Succeeded),
            JobStatus::Error if self.error.as_deref().is_some_and(is_skip_reason) => {
                Some(JobOutcome::Skipped)
            }
            JobStatus::Error => Some(JobOutcome::Failed),
            JobStatus::Pending | JobStatus::Running => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.outcome() == Some(JobOutcome::Skipped)
    }
}

/// True for `skip:`-prefixed error strings (case-insensitive, leading space ignored).
pub fn is_skip_reason(error: &str) -> bool {
    error
        .trim_start()
        .get(..SKIP_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(SKIP_PREFIX))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobTransitionError {
    #[error("job list was already declared for this run")]
    AlreadyDeclared,

    #[error("job {0} is declared more than once")]
    DuplicateIndex(u32),

    #[error("job {0} was not declared by the plan")]
    Undeclared(u32),

    #[error("job {index} cannot move from {from:?} to {to:?}")]
    Regression { index: u32, from: JobStatus, to: JobStatus },
}

/// All jobs of one run, keyed by plan index.
#[derive(Debug, Clone, Default)]
pub struct JobBoard {
    jobs: BTreeMap<u32, Job>,
    declared: bool,
}

impl JobBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the full job list in `pending`. Only one declaration per run.
    pub fn declare<I, S>(&mut self, chunks: I) -> Result<(), JobTransitionError>
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        if self.declared {
            return Err(JobTransitionError::AlreadyDeclared);
        }

        let mut jobs = BTreeMap::new();
        for (index, path) in chunks {
            if jobs.insert(index, Job::pending(index, path)).is_some() {
                return Err(JobTransitionError::DuplicateIndex(index));
            }
        }

        self.jobs = jobs;
        self.declared = true;
        Ok(())
    }

    pub fn is_declared(&self) -> bool {
        self.declared
    }

    pub fn start(&mut self, index: u32, at: DateTime<Utc>) -> Result<&Job, JobTransitionError> {
        let job = self.advance(index, JobStatus::Running)?;
        job.started_at = Some(at);
        Ok(job)
    }

    /// Move a job to `ok` or `error`. A missing `ms` is derived from the start time.
    pub fn complete(
        &mut self,
        index: u32,
        ok: bool,
        ms: Option<u64>,
        error: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<&Job, JobTransitionError> {
        let status = if ok { JobStatus::Ok } else { JobStatus::Error };
        let job = self.advance(index, status)?;
        let started_at = job.started_at;
        job.ms = ms.or_else(|| {
            started_at
                .map(|started| at.signed_duration_since(started).num_milliseconds().max(0) as u64)
        });
        job.error = if ok { None } else { Some(error.unwrap_or_else(|| "unknown error".into())) };
        Ok(job)
    }

    /// Force every non-terminal job to `error(reason)`. Returns affected indexes.
    pub fn fail_outstanding(&mut self, reason: &str) -> Vec<u32> {
        let mut affected = Vec::new();
        for job in self.jobs.values_mut() {
            if !job.status.is_terminal() {
                job.status = JobStatus::Error;
                job.error = Some(reason.to_string());
                affected.push(job.index);
            }
        }
        affected
    }

    pub fn get(&self, index: u32) -> Option<&Job> {
        self.jobs.get(&index)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn snapshot(&self) -> Vec<Job> {
        self.jobs.values().cloned().collect()
    }

    pub fn count(&self, outcome: JobOutcome) -> usize {
        self.jobs.values().filter(|job| job.outcome() == Some(outcome)).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(JobOutcome::Succeeded)
    }

    /// Failures excluding intentional `skip:` omissions.
    pub fn failed_real(&self) -> usize {
        self.count(JobOutcome::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(JobOutcome::Skipped)
    }

    pub fn outstanding(&self) -> usize {
        self.jobs.values().filter(|job| !job.status.is_terminal()).count()
    }

    /// Jobs with the given outcome, in index order.
    pub fn filtered(&self, outcome: JobOutcome) -> Vec<&Job> {
        self.jobs.values().filter(|job| job.outcome() == Some(outcome)).collect()
    }

    fn advance(&mut self, index: u32, to: JobStatus) -> Result<&mut Job, JobTransitionError> {
        let job = self.jobs.get_mut(&index).ok_or(JobTransitionError::Undeclared(index))?;
        if to.rank() <= job.status.rank() {
            return Err(JobTransitionError::Regression { index, from: job.status, to });
        }
        job.status = to;
        Ok(job)
    }
}

/// Aggregate of one finished run. Replaced wholesale by the next run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub planner_ms: Option<u64>,
    pub planner_model: Option<String>,
    pub executor_ms: Option<u64>,
    pub chunks_planned: usize,
    pub chunks_succeeded: usize,
    /// Failure count as reported by the executor; may include skips.
    pub chunks_failed: usize,
    pub jobs: Vec<Job>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Build from the terminal board and the executor's metadata. Counts the
    /// metadata omits are derived from the board.
    pub fn finalize(board: &JobBoard, metadata: &RunMetadata, finished_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            planner_ms: metadata.planner_ms,
            planner_model: metadata.planner_model.clone(),
            executor_ms: metadata.executor_ms,
            chunks_planned: metadata.chunks_planned.unwrap_or(board.len()),
            chunks_succeeded: metadata.chunks_succeeded.unwrap_or_else(|| board.succeeded()),
            chunks_failed: metadata
                .chunks_failed
                .unwrap_or_else(|| board.failed_real() + board.skipped()),
            jobs: board.snapshot(),
            finished_at,
        }
    }

    /// Real failures only, excluding `skip:` outcomes.
    pub fn failed_real(&self) -> usize {
        self.jobs.iter().filter(|job| job.outcome() == Some(JobOutcome::Failed)).count()
    }

    pub fn skipped(&self) -> usize {
        self.jobs.iter().filter(|job| job.is_skipped()).count()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn board_with(n: u32) -> JobBoard {
        let mut board = JobBoard::new();
        board.declare((0..n).map(|i| (i, format!("path.{i}")))).expect("declare should succeed");
        board
    }

    // ── Declaration ────────────────────────────────────────────────

    #[test]
    fn declare_creates_pending_jobs() {
        let board = board_with(3);
        assert_eq!(board.len(), 3);
        assert!(board.jobs().all(|job| job.status == JobStatus::Pending));
        assert_eq!(board.outstanding(), 3);
    }

    #[test]
    fn declare_twice_is_rejected() {
        let mut board = board_with(1);
        assert_eq!(board.declare([(9u32, "x")]), Err(JobTransitionError::AlreadyDeclared));
        assert!(board.get(9).is_none());
    }

    #[test]
    fn duplicate_index_is_rejected() {
        let mut board = JobBoard::new();
        let err = board.declare([(1u32, "a"), (1u32, "b")]).unwrap_err();
        assert_eq!(err, JobTransitionError::DuplicateIndex(1));
        assert!(!board.is_declared());
    }

    // ── Transitions ────────────────────────────────────────────────

    #[test]
    fn undeclared_index_never_appears() {
        let mut board = board_with(2);
        let now = Utc::now();
        assert_eq!(board.start(7, now).unwrap_err(), JobTransitionError::Undeclared(7));
        assert_eq!(
            board.complete(7, true, None, None, now).unwrap_err(),
            JobTransitionError::Undeclared(7)
        );
        assert!(board.get(7).is_none());
    }

    #[test]
    fn terminal_status_never_regresses() {
        let mut board = board_with(1);
        let now = Utc::now();
        board.start(0, now).unwrap();
        board.complete(0, true, Some(10), None, now).unwrap();

        assert!(matches!(board.start(0, now), Err(JobTransitionError::Regression { .. })));
        assert!(matches!(
            board.complete(0, false, None, Some("late".into()), now),
            Err(JobTransitionError::Regression { .. })
        ));
        let job = board.get(0).unwrap();
        assert_eq!(job.status, JobStatus::Ok);
        assert_eq!(job.error, None);
    }

    #[test]
    fn duplicate_start_is_rejected() {
        let mut board = board_with(1);
        let now = Utc::now();
        board.start(0, now).unwrap();
        assert!(board.start(0, now).is_err());
        assert_eq!(board.get(0).unwrap().status, JobStatus::Running);
    }

    #[test]
    fn pending_may_complete_without_observed_start() {
        let mut board = board_with(1);
        board.complete(0, false, Some(3), Some("boom".into()), Utc::now()).unwrap();
        assert_eq!(board.get(0).unwrap().status, JobStatus::Error);
    }

    #[test]
    fn out_of_order_completion_is_tracked_by_index() {
        let mut board = board_with(3);
        let now = Utc::now();
        board.start(2, now).unwrap();
        board.start(0, now).unwrap();
        board.complete(2, true, Some(5), None, now).unwrap();
        board.start(1, now).unwrap();
        board.complete(0, true, Some(8), None, now).unwrap();
        board.complete(1, true, Some(2), None, now).unwrap();

        assert_eq!(board.succeeded(), 3);
        assert_eq!(board.get(2).unwrap().ms, Some(5));
    }

    #[test]
    fn missing_duration_is_derived_from_start_time() {
        let mut board = board_with(1);
        let started = Utc::now();
        board.start(0, started).unwrap();
        let finished = started + Duration::milliseconds(250);
        let job = board.complete(0, true, None, None, finished).unwrap();
        assert_eq!(job.ms, Some(250));
    }

    // ── Accounting ─────────────────────────────────────────────────

    #[test]
    fn skip_is_counted_apart_from_real_failures() {
        let mut board = board_with(5);
        let now = Utc::now();
        board.complete(0, true, Some(1), None, now).unwrap();
        board.complete(1, false, Some(1), Some("skip: not applicable".into()), now).unwrap();
        board.complete(2, true, Some(1), None, now).unwrap();
        board.complete(3, false, Some(1), Some("model refused".into()), now).unwrap();
        board.complete(4, false, Some(1), Some("invalid json".into()), now).unwrap();

        assert_eq!(board.succeeded(), 2);
        assert_eq!(board.failed_real(), 2);
        assert_eq!(board.skipped(), 1);
        let skipped: Vec<u32> =
            board.filtered(JobOutcome::Skipped).iter().map(|j| j.index).collect();
        assert_eq!(skipped, vec![1]);
    }

    #[test]
    fn skip_prefix_detection() {
        assert!(is_skip_reason("skip: nothing to change"));
        assert!(is_skip_reason("  SKIP:upper"));
        assert!(!is_skip_reason("skipped"));
        assert!(!is_skip_reason("error: skip: nested"));
        assert!(!is_skip_reason(""));
    }

    #[test]
    fn fail_outstanding_only_touches_non_terminal_jobs() {
        let mut board = board_with(3);
        let now = Utc::now();
        board.complete(0, true, Some(1), None, now).unwrap();
        board.start(1, now).unwrap();

        let affected = board.fail_outstanding(CANCELLED_REASON);
        assert_eq!(affected, vec![1, 2]);
        assert_eq!(board.get(0).unwrap().status, JobStatus::Ok);
        assert_eq!(board.get(1).unwrap().error.as_deref(), Some(CANCELLED_REASON));
        assert_eq!(board.outstanding(), 0);
        assert_eq!(board.failed_real(), 2);
    }

    // ── RunSummary ─────────────────────────────────────────────────

    #[test]
    fn summary_prefers_metadata_counts_and_derives_the_rest() {
        let mut board = board_with(2);
        let now = Utc::now();
        board.complete(0, true, Some(1), None, now).unwrap();
        board.complete(1, false, Some(1), Some("skip: n/a".into()), now).unwrap();

        let metadata = RunMetadata {
            planner_ms: Some(900),
            planner_model: Some("planner-x".into()),
            executor_ms: Some(4200),
            chunks_succeeded: Some(1),
            ..RunMetadata::default()
        };
        let summary = RunSummary::finalize(&board, &metadata, now);

        assert_eq!(summary.chunks_planned, 2);
        assert_eq!(summary.chunks_succeeded, 1);
        assert_eq!(summary.chunks_failed, 1);
        assert_eq!(summary.failed_real(), 0);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.planner_model.as_deref(), Some("planner-x"));
        assert_eq!(summary.jobs.len(), 2);
    }
}
