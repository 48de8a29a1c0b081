// Per-run event handling for the execution stream.
//
// `RunState` consumes one decoded line at a time and drives the job board.
// It knows nothing about HTTP; the client feeds it lines and stops reading
// as soon as a terminal step comes back.

use std::sync::OnceLock;

use atelier_common::jobs::{Job, JobBoard, RunSummary, CANCELLED_REASON};
use atelier_common::protocol::execute::{is_terminal_kind, unwrap_candidate, StreamEvent};
use atelier_common::schema::validate_document;
use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::error::{clip_body, ExecError};

/// A successful run: the merged candidate document and its summary.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub candidate: Value,
    pub summary: RunSummary,
}

#[derive(Debug)]
pub(crate) enum Step {
    Continue,
    Finished(ExecutionOutcome),
}

fn terminal_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#""type"\s*:\s*"(?:result|error)""#)
            .expect("terminal line pattern should compile")
    })
}

pub(crate) struct RunState {
    board: JobBoard,
    progress: Option<UnboundedSender<Job>>,
    skipped_lines: usize,
}

impl RunState {
    pub fn new(progress: Option<UnboundedSender<Job>>) -> Self {
        Self { board: JobBoard::new(), progress, skipped_lines: 0 }
    }

    pub fn board(&self) -> &JobBoard {
        &self.board
    }

    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    /// Handle one complete line.
    ///
    /// Unparseable or unknown lines are skipped, except that a line that
    /// looks terminal but fails to parse aborts the run.
    pub fn handle_line(&mut self, line: &str) -> Result<Step, ExecError> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(error) => {
                if terminal_line_pattern().is_match(line) {
                    return Err(self.malformed_terminal(line));
                }
                self.skipped_lines += 1;
                warn!(%error, line = %clip_body(line), "skipping malformed stream line");
                return Ok(Step::Continue);
            }
        };

        let kind = value.get("type").and_then(Value::as_str).unwrap_or_default().to_string();
        match serde_json::from_value::<StreamEvent>(value) {
            Ok(event) => self.handle_event(event),
            Err(_) if is_terminal_kind(&kind) => Err(self.malformed_terminal(line)),
            Err(error) => {
                self.skipped_lines += 1;
                warn!(kind = %kind, %error, "skipping unrecognized stream event");
                Ok(Step::Continue)
            }
        }
    }

    pub fn handle_event(&mut self, event: StreamEvent) -> Result<Step, ExecError> {
        debug!(kind = event.kind(), "stream event");
        match event {
            StreamEvent::Plan { paths } => {
                let declared = self.board.declare(paths.into_iter().map(|c| (c.index, c.path)));
                match declared {
                    Ok(()) => {
                        let jobs = self.board.snapshot();
                        for job in jobs {
                            self.emit(job);
                        }
                    }
                    Err(error) => warn!(%error, "ignoring plan event"),
                }
            }
            StreamEvent::ChunkStart { index } => match self.board.start(index, Utc::now()) {
                Ok(job) => {
                    let job = job.clone();
                    self.emit(job);
                }
                Err(error) => warn!(index, %error, "ignoring chunk_start"),
            },
            StreamEvent::ChunkComplete { index, ok, ms, error } => {
                match self.board.complete(index, ok, ms, error, Utc::now()) {
                    Ok(job) => {
                        let job = job.clone();
                        self.emit(job);
                    }
                    Err(error) => warn!(index, %error, "ignoring chunk_complete"),
                }
            }
            StreamEvent::Result { success: false, error, .. } => {
                let message = error.unwrap_or_else(|| "executor reported failure".into());
                return Err(ExecError::Unsuccessful { message, jobs: self.board.snapshot() });
            }
            StreamEvent::Result { success: true, enhanced_data, metadata, .. } => {
                let candidate = enhanced_data.and_then(unwrap_candidate).ok_or_else(|| {
                    ExecError::InvalidCandidate {
                        reason: "result carries no document".into(),
                        jobs: self.board.snapshot(),
                    }
                })?;
                if let Err(error) = validate_document(&candidate) {
                    return Err(ExecError::InvalidCandidate {
                        reason: error.to_string(),
                        jobs: self.board.snapshot(),
                    });
                }
                let summary = RunSummary::finalize(&self.board, &metadata, Utc::now());
                return Ok(Step::Finished(ExecutionOutcome { candidate, summary }));
            }
            StreamEvent::Error { message } => {
                return Err(ExecError::Remote { message, jobs: self.board.snapshot() });
            }
        }
        Ok(Step::Continue)
    }

    /// Force outstanding jobs to `error("cancelled")`.
    pub fn cancel(mut self) -> ExecError {
        let affected = self.board.fail_outstanding(CANCELLED_REASON);
        for index in &affected {
            if let Some(job) = self.board.get(*index).cloned() {
                self.emit(job);
            }
        }
        warn!(cancelled_jobs = affected.len(), "execution cancelled");
        ExecError::Cancelled { jobs: self.board.snapshot() }
    }

    /// Jobs keep their last-known state.
    pub fn transport_failure(self, message: String) -> ExecError {
        ExecError::Transport { message, jobs: self.board.snapshot() }
    }

    pub fn ended_without_result(self) -> ExecError {
        ExecError::StreamEnded { jobs: self.board.snapshot() }
    }

    fn malformed_terminal(&self, line: &str) -> ExecError {
        ExecError::MalformedTerminal { line: clip_body(line), jobs: self.board.snapshot() }
    }

    fn emit(&self, job: Job) {
        if let Some(progress) = &self.progress {
            let _ = progress.send(job);
        }
    }
}
