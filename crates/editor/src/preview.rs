// Preview / commit / revert of execution results.
//
// clean -> previewing -> {committed, clean (rejected)}; committed becomes
// saved once the store persists it. The last outcome stays cached so it can
// be previewed again without another plan/execute round trip.

use atelier_common::jobs::RunSummary;
use tracing::info;

use crate::error::{EditorError, PreviewError};
use crate::exec::ExecutionOutcome;
use crate::store::{DocumentStore, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewState {
    Clean,
    Previewing,
    Committed,
    /// Committed and since persisted.
    Saved,
}

#[derive(Debug, Default)]
pub struct PreviewController {
    previewing: bool,
    committed: bool,
    backup: Option<Snapshot>,
    cached: Option<ExecutionOutcome>,
}

impl PreviewController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, store: &DocumentStore) -> PreviewState {
        match (self.previewing, self.committed) {
            (true, _) => PreviewState::Previewing,
            (false, true) if store.is_dirty() => PreviewState::Committed,
            (false, true) => PreviewState::Saved,
            (false, false) => PreviewState::Clean,
        }
    }

    pub fn is_previewing(&self) -> bool {
        self.previewing
    }

    /// Back up the working copy and apply `outcome.candidate` over it.
    pub fn preview(
        &mut self,
        store: &DocumentStore,
        outcome: ExecutionOutcome,
    ) -> Result<(), EditorError> {
        if self.previewing {
            return Err(PreviewError::AlreadyPreviewing.into());
        }
        let backup = store.begin_preview(outcome.candidate.clone())?;
        info!(run_id = %outcome.summary.run_id, "preview applied");
        self.backup = Some(backup);
        self.cached = Some(outcome);
        self.previewing = true;
        self.committed = false;
        Ok(())
    }

    /// Restore the exact pre-preview document.
    pub fn reject(&mut self, store: &DocumentStore) -> Result<(), EditorError> {
        if !self.previewing {
            return Err(PreviewError::NotPreviewing.into());
        }
        self.previewing = false;
        let backup = self.backup.take().ok_or(PreviewError::NotPreviewing)?;
        store.end_preview_reject(&backup)?;
        info!("preview rejected");
        Ok(())
    }

    /// Keep the candidate as the working copy. Does not save.
    pub fn accept(&mut self, store: &DocumentStore) -> Result<(), EditorError> {
        if !self.previewing {
            return Err(PreviewError::NotPreviewing.into());
        }
        self.previewing = false;
        self.backup = None;
        store.end_preview_accept()?;
        self.committed = true;
        info!("preview accepted");
        Ok(())
    }

    /// Preview the cached outcome again.
    pub fn repreview(&mut self, store: &DocumentStore) -> Result<(), EditorError> {
        let outcome = self.cached.clone().ok_or(PreviewError::NothingCached)?;
        self.preview(store, outcome)
    }

    pub fn cached(&self) -> Option<&ExecutionOutcome> {
        self.cached.as_ref()
    }

    pub fn last_summary(&self) -> Option<&RunSummary> {
        self.cached.as_ref().map(|outcome| &outcome.summary)
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::time::Duration;

    use atelier_common::jobs::JobBoard;
    use atelier_common::protocol::execute::RunMetadata;
    use chrono::Utc;
    use serde_json::{json, Value};

    use super::*;
    use crate::error::LoadError;
    use crate::source::DocumentSource;
    use crate::test_support::RecordingPersistence;

    struct FixedSource(Value);

    impl DocumentSource for FixedSource {
        fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<Value, LoadError>> + Send>> {
            let doc = self.0.clone();
            Box::pin(async move { Ok(doc) })
        }
    }

    fn original() -> Value {
        json!({
            "colors": { "primary": "#0A4D68", "accent": "#F4A261" },
            "buttons": { "primary": { "background": "#0A4D68", "radius": "4px" } }
        })
    }

    fn outcome(candidate: Value) -> ExecutionOutcome {
        ExecutionOutcome {
            candidate,
            summary: RunSummary::finalize(&JobBoard::new(), &RunMetadata::default(), Utc::now()),
        }
    }

    async fn setup() -> (DocumentStore, RecordingPersistence, PreviewController) {
        let persistence = RecordingPersistence::default();
        let store = DocumentStore::new(
            Arc::new(FixedSource(original())),
            Arc::new(persistence.clone()),
            Duration::from_millis(500),
        );
        store.load().await.expect("load should succeed");
        (store, persistence, PreviewController::new())
    }

    fn candidate() -> Value {
        json!({
            "colors": { "primary": "#E76F51", "accent": "#F4A261" },
            "buttons": { "primary": { "background": "#E76F51", "radius": "9999px" } }
        })
    }

    #[tokio::test]
    async fn reject_restores_exact_prior_document() {
        let (store, _, mut preview) = setup().await;
        store.set_path(&"colors.accent".parse().unwrap(), json!("#2A9D8F")).unwrap();
        let before = store.current_document().unwrap();
        let dirty_before = store.is_dirty();

        preview.preview(&store, outcome(candidate())).unwrap();
        assert_eq!(preview.state(&store), PreviewState::Previewing);
        assert_eq!(store.current_document().unwrap(), candidate());

        preview.reject(&store).unwrap();
        assert_eq!(store.current_document().unwrap(), before);
        assert_eq!(store.is_dirty(), dirty_before);
        assert_eq!(preview.state(&store), PreviewState::Clean);
    }

    #[tokio::test]
    async fn accept_commits_without_saving() {
        let (store, persistence, mut preview) = setup().await;
        preview.preview(&store, outcome(candidate())).unwrap();
        preview.accept(&store).unwrap();

        assert_eq!(store.current_document().unwrap(), candidate());
        assert!(store.is_dirty());
        assert_eq!(persistence.save_count(), 0);
        assert_eq!(preview.state(&store), PreviewState::Committed);

        store.save().await.unwrap();
        assert_eq!(preview.state(&store), PreviewState::Saved);
    }

    #[tokio::test]
    async fn second_preview_is_rejected_while_open() {
        let (store, _, mut preview) = setup().await;
        preview.preview(&store, outcome(candidate())).unwrap();
        let err = preview.preview(&store, outcome(original())).unwrap_err();
        assert!(matches!(err, EditorError::Preview(PreviewError::AlreadyPreviewing)));
        assert_eq!(store.current_document().unwrap(), candidate());
    }

    #[tokio::test]
    async fn accept_and_reject_require_open_preview() {
        let (store, _, mut preview) = setup().await;
        assert!(matches!(
            preview.accept(&store),
            Err(EditorError::Preview(PreviewError::NotPreviewing))
        ));
        assert!(matches!(
            preview.reject(&store),
            Err(EditorError::Preview(PreviewError::NotPreviewing))
        ));
        assert!(matches!(
            preview.repreview(&store),
            Err(EditorError::Preview(PreviewError::NothingCached))
        ));
    }

    #[tokio::test]
    async fn cached_result_can_be_previewed_again() {
        let (store, _, mut preview) = setup().await;
        preview.preview(&store, outcome(candidate())).unwrap();
        preview.reject(&store).unwrap();
        assert_eq!(store.current_document().unwrap(), original());

        preview.repreview(&store).unwrap();
        assert_eq!(store.current_document().unwrap(), candidate());
        preview.accept(&store).unwrap();

        store.revert_to_baseline().unwrap();
        preview.repreview(&store).unwrap();
        assert_eq!(store.current_document().unwrap(), candidate());
        assert!(preview.last_summary().is_some());
    }
}
