// Error taxonomy for the editing engine.
//
// Every failure maps to a stable `ErrorKind` so the UI can pick an
// affordance (retry vs. fatal) without matching on message text.

use atelier_common::jobs::Job;
use atelier_common::path::PathError;
use atelier_common::schema::SchemaError;
use thiserror::Error;

use crate::config::ConfigError;

/// Maximum number of response-body bytes kept in an error for diagnostics.
pub(crate) const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    LoadFailed,
    NotLoaded,
    InvalidPath,
    PlanningFailed,
    ExecutionFailed,
    ExecutionCancelled,
    SaveFailed,
    PreviewConflict,
    Busy,
    Config,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoadFailed => "LOAD_FAILED",
            Self::NotLoaded => "NOT_LOADED",
            Self::InvalidPath => "INVALID_PATH",
            Self::PlanningFailed => "PLANNING_FAILED",
            Self::ExecutionFailed => "EXECUTION_FAILED",
            Self::ExecutionCancelled => "EXECUTION_CANCELLED",
            Self::SaveFailed => "SAVE_FAILED",
            Self::PreviewConflict => "PREVIEW_CONFLICT",
            Self::Busy => "BUSY",
            Self::Config => "CONFIG_INVALID",
        }
    }

    /// Whether offering the user a retry makes sense.
    pub const fn retryable(self) -> bool {
        matches!(
            self,
            Self::PlanningFailed | Self::ExecutionFailed | Self::SaveFailed | Self::Busy
        )
    }

    /// Load failures end the editing session.
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::LoadFailed | Self::Config)
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("document request failed: {0}")]
    Transport(String),

    #[error("document request timed out")]
    Timeout,

    #[error("document endpoint returned status {status}")]
    Status { status: u16 },

    #[error("document body is not valid JSON: {0}")]
    Decode(String),

    #[error("document failed schema validation: {0}")]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("planning request timed out after {0} ms")]
    Timeout(u64),

    #[error("planning request failed: {0}")]
    Transport(String),

    #[error("planning endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("planning response is malformed: {0}")]
    Malformed(String),

    #[error("planner rejected the instruction: {0}")]
    Rejected(String),

    #[error("plan contains no targets from the scope index")]
    EmptyPlan,
}

/// Execution failures carry the last-known job list for display.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("execution request failed: {message}")]
    Transport { message: String, jobs: Vec<Job> },

    #[error("execution endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("executor reported an error: {message}")]
    Remote { message: String, jobs: Vec<Job> },

    #[error("executor finished unsuccessfully: {message}")]
    Unsuccessful { message: String, jobs: Vec<Job> },

    #[error("terminal stream event could not be parsed: {line}")]
    MalformedTerminal { line: String, jobs: Vec<Job> },

    #[error("execution stream ended without a result event")]
    StreamEnded { jobs: Vec<Job> },

    #[error("executor result does not contain a usable document: {reason}")]
    InvalidCandidate { reason: String, jobs: Vec<Job> },

    #[error("execution was cancelled")]
    Cancelled { jobs: Vec<Job> },
}

impl ExecError {
    /// Job states at the moment the run failed.
    pub fn jobs(&self) -> &[Job] {
        match self {
            Self::Transport { jobs, .. }
            | Self::Remote { jobs, .. }
            | Self::Unsuccessful { jobs, .. }
            | Self::MalformedTerminal { jobs, .. }
            | Self::StreamEnded { jobs }
            | Self::InvalidCandidate { jobs, .. }
            | Self::Cancelled { jobs } => jobs,
            Self::Status { .. } => &[],
        }
    }
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("document could not be serialized: {0}")]
    Serialize(String),

    #[error("save request failed: {0}")]
    Transport(String),

    #[error("save endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("save response is malformed: {0}")]
    Decode(String),

    #[error("persistence service reported failure")]
    Rejected,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreviewError {
    #[error("a preview is already open; accept or reject it first")]
    AlreadyPreviewing,

    #[error("no preview is open")]
    NotPreviewing,

    #[error("no cached result to preview")]
    NothingCached,

    #[error("accept or reject the open preview first")]
    PreviewOpen,
}

#[derive(Debug, Error)]
pub enum EditorError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("no document is loaded")]
    NotLoaded,

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Save(#[from] SaveError),

    #[error(transparent)]
    Preview(#[from] PreviewError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("a mutation run is already in flight")]
    Busy,
}

impl EditorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Load(_) => ErrorKind::LoadFailed,
            Self::NotLoaded => ErrorKind::NotLoaded,
            Self::Path(_) => ErrorKind::InvalidPath,
            Self::Plan(_) => ErrorKind::PlanningFailed,
            Self::Exec(ExecError::Cancelled { .. }) => ErrorKind::ExecutionCancelled,
            Self::Exec(_) => ErrorKind::ExecutionFailed,
            Self::Save(_) => ErrorKind::SaveFailed,
            Self::Preview(_) => ErrorKind::PreviewConflict,
            Self::Config(_) => ErrorKind::Config,
            Self::Busy => ErrorKind::Busy,
        }
    }

    pub fn retryable(&self) -> bool {
        self.kind().retryable()
    }
}

/// Clip a response body for inclusion in an error message.
pub(crate) fn clip_body(body: &str) -> String {
    if body.len() <= ERROR_BODY_LIMIT {
        return body.to_string();
    }
    let mut end = ERROR_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinguishable_per_category() {
        let cases: Vec<(EditorError, &str)> = vec![
            (LoadError::Timeout.into(), "LOAD_FAILED"),
            (PlanError::Timeout(10).into(), "PLANNING_FAILED"),
            (ExecError::StreamEnded { jobs: vec![] }.into(), "EXECUTION_FAILED"),
            (ExecError::Cancelled { jobs: vec![] }.into(), "EXECUTION_CANCELLED"),
            (SaveError::Rejected.into(), "SAVE_FAILED"),
            (PreviewError::AlreadyPreviewing.into(), "PREVIEW_CONFLICT"),
            (EditorError::Busy, "BUSY"),
            (EditorError::NotLoaded, "NOT_LOADED"),
        ];
        for (error, code) in cases {
            assert_eq!(error.kind().as_str(), code, "{error}");
        }
    }

    #[test]
    fn load_is_fatal_and_save_is_retryable() {
        let load: EditorError = LoadError::Status { status: 500 }.into();
        assert!(load.kind().is_fatal());
        assert!(!load.retryable());

        let save: EditorError = SaveError::Transport("reset".into()).into();
        assert!(save.retryable());
        assert!(!save.kind().is_fatal());
    }

    #[test]
    fn clip_body_respects_char_boundaries() {
        let long = "é".repeat(ERROR_BODY_LIMIT);
        let clipped = clip_body(&long);
        assert!(clipped.ends_with('…'));
        assert!(clipped.len() <= ERROR_BODY_LIMIT + '…'.len_utf8());
        assert_eq!(clip_body("short"), "short");
    }
}
