// atelier-editor: document mutation and transaction engine.

pub mod config;
pub mod error;
pub mod exec;
pub mod persist;
pub mod pipeline;
pub mod plan;
pub mod preview;
pub mod scope;
pub mod source;
pub mod store;

#[cfg(test)]
mod test_support;

pub use config::EditorConfig;
pub use error::{EditorError, ErrorKind};
pub use exec::{cancel_pair, CancelHandle, CancelToken, ExecClient, ExecutionOutcome};
pub use pipeline::{MutationPipeline, PipelineOutcome, RunRequest};
pub use plan::PlanClient;
pub use preview::{PreviewController, PreviewState};
pub use scope::ScopeIndex;
pub use store::DocumentStore;
