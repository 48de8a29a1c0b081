// Streaming execution client.
//
// Issues one POST and reads the NDJSON response incrementally. Lines are
// framed across network reads, handed to `RunState`, and reading stops at
// the first terminal event. Cancellation is checked before every read.

mod cancel;
mod run;

use std::time::Instant;

use atelier_common::jobs::Job;
use atelier_common::protocol::execute::{ExecuteData, ExecuteRequest};
use atelier_common::protocol::ndjson::LineDecoder;
use atelier_common::types::MutationPlan;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use run::ExecutionOutcome;

use self::run::{RunState, Step};
use crate::config::EditorConfig;
use crate::error::{clip_body, ExecError};

/// Inputs for one execution run.
#[derive(Debug, Clone)]
pub struct ExecRequest<'a> {
    pub document: &'a Value,
    pub instruction: &'a str,
    pub plan: &'a MutationPlan,
    /// Overrides the client's default executor model.
    pub model: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct ExecClient {
    client: Client,
    url: String,
    model: String,
}

impl ExecClient {
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Self {
        Self { client: Client::new(), url: url.into(), model: model.into() }
    }

    pub fn from_config(config: &EditorConfig) -> Self {
        Self::new(config.endpoints.execute_url.clone(), config.models.executor.clone())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run the plan against `document` and return the merged candidate.
    ///
    /// Every job change is sent to `progress` when given. On failure the
    /// error carries the job list as last seen.
    pub async fn execute(
        &self,
        request: ExecRequest<'_>,
        mut cancel: CancelToken,
        progress: Option<UnboundedSender<Job>>,
    ) -> Result<ExecutionOutcome, ExecError> {
        let started = Instant::now();
        let run = RunState::new(progress);
        let body = ExecuteRequest {
            data: ExecuteData { document: request.document.clone() },
            prompt: request.instruction.to_string(),
            model: request.model.unwrap_or(self.model.as_str()).to_string(),
            planner_output: request.plan.clone(),
        };
        debug!(url = %self.url, targets = request.plan.len(), "starting execution");

        let send = self.client.post(&self.url).json(&body).send();
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(run.cancel()),
            sent = send => sent,
        };
        let response = match sent {
            Ok(response) => response,
            Err(error) => return Err(run.transport_failure(error.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecError::Status { status: status.as_u16(), body: clip_body(&body) });
        }

        let outcome = consume(response, run, &mut cancel).await?;
        info!(
            run_id = %outcome.summary.run_id,
            chunks = outcome.summary.chunks_planned,
            succeeded = outcome.summary.chunks_succeeded,
            failed = outcome.summary.failed_real(),
            skipped = outcome.summary.skipped(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "execution finished"
        );
        Ok(outcome)
    }
}

async fn consume(
    mut response: reqwest::Response,
    mut run: RunState,
    cancel: &mut CancelToken,
) -> Result<ExecutionOutcome, ExecError> {
    let mut decoder = LineDecoder::new();
    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(run.cancel()),
            read = response.chunk() => read,
        };
        match read {
            Ok(Some(bytes)) => {
                for line in decoder.push(&bytes) {
                    if let Step::Finished(outcome) = run.handle_line(&line)? {
                        return Ok(outcome);
                    }
                }
            }
            Ok(None) => break,
            Err(error) => return Err(run.transport_failure(error.to_string())),
        }
    }

    if let Some(line) = decoder.finish() {
        if let Step::Finished(outcome) = run.handle_line(&line)? {
            return Ok(outcome);
        }
    }
    debug!(skipped_lines = run.skipped_lines(), "stream closed before a result event");
    Err(run.ended_without_result())
}
