// The single owner of the working document.
//
// Every change, whether a hand edit or an applied AI result, goes through
// this store. Callers read clones; no second writable handle exists. State
// sits behind a mutex, and saves are serialized by an async gate so a
// manual save and an autosave never overlap.

mod autosave;
mod snapshot;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use atelier_common::path::{self, PathAddress};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

pub use snapshot::{canonical_json, Snapshot};

use self::autosave::AutosaveSignal;
use crate::config::EditorConfig;
use crate::error::{EditorError, PreviewError, SaveError};
use crate::persist::{HttpPersistence, PersistenceAdapter, SaveReceipt};
use crate::source::{DocumentSource, HttpDocumentSource};

#[derive(Default)]
struct StoreState {
    working: Option<Value>,
    baseline: Option<Snapshot>,
    last_saved_at: Option<DateTime<Utc>>,
    autosave_enabled: bool,
    preview_active: bool,
    /// Bumped on every replacement of the working copy.
    revision: u64,
}

struct StoreShared {
    state: Mutex<StoreState>,
    save_gate: tokio::sync::Mutex<()>,
    source: Arc<dyn DocumentSource>,
    persistence: Arc<dyn PersistenceAdapter>,
    autosave_delay: Duration,
    autosave_tx: Mutex<Option<UnboundedSender<AutosaveSignal>>>,
}

/// Cheap to clone; clones share the same document.
#[derive(Clone)]
pub struct DocumentStore {
    shared: Arc<StoreShared>,
}

impl DocumentStore {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        persistence: Arc<dyn PersistenceAdapter>,
        autosave_delay: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(StoreShared {
                state: Mutex::new(StoreState::default()),
                save_gate: tokio::sync::Mutex::new(()),
                source,
                persistence,
                autosave_delay,
                autosave_tx: Mutex::new(None),
            }),
        }
    }

    /// HTTP source and persistence from config. Autosave starts enabled if
    /// the config says so.
    pub fn from_config(config: &EditorConfig) -> Result<Self, EditorError> {
        config.validate()?;
        let source = HttpDocumentSource::from_config(config)?;
        let persistence = HttpPersistence::from_config(config)?;
        let store = Self::new(Arc::new(source), Arc::new(persistence), config.autosave.delay());
        store.set_autosave(config.autosave.enabled);
        Ok(store)
    }

    /// Fetch the document and make it both the working copy and the baseline.
    ///
    /// On failure nothing changes: a previously loaded document stays as it
    /// was, and a fresh store stays empty.
    pub async fn load(&self) -> Result<(), EditorError> {
        let started = Instant::now();
        let doc = self.shared.source.fetch().await.map_err(|error| {
            warn!(%error, "document load failed");
            error
        })?;

        {
            let mut state = self.state();
            state.baseline = Some(Snapshot::capture(&doc));
            state.working = Some(doc);
            state.preview_active = false;
            state.revision += 1;
        }
        self.signal(AutosaveSignal::Cancel);
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "document loaded");
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.state().working.is_some()
    }

    /// A deep copy of the working document.
    pub fn current_document(&self) -> Result<Value, EditorError> {
        self.state().working.clone().ok_or(EditorError::NotLoaded)
    }

    /// Borrow the working document without cloning it.
    pub fn with_document<R>(&self, read: impl FnOnce(&Value) -> R) -> Result<R, EditorError> {
        let state = self.state();
        state.working.as_ref().map(read).ok_or(EditorError::NotLoaded)
    }

    pub fn get(&self, path: &PathAddress) -> Result<Option<Value>, EditorError> {
        self.with_document(|doc| path::get(doc, path).cloned())
    }

    /// Replace the working copy with `updater(copy)`.
    ///
    /// The updater receives its own deep copy and runs while the store is
    /// locked; it must not call back into the store.
    pub fn mutate(&self, updater: impl FnOnce(Value) -> Value) -> Result<u64, EditorError> {
        self.try_mutate(|doc| Ok::<_, EditorError>(updater(doc)))
    }

    /// Like `mutate`, but the working copy is left untouched if the updater fails.
    pub fn try_mutate<E>(
        &self,
        updater: impl FnOnce(Value) -> Result<Value, E>,
    ) -> Result<u64, EditorError>
    where
        E: Into<EditorError>,
    {
        let (revision, touch) = {
            let mut state = self.state();
            let copy = state.working.clone().ok_or(EditorError::NotLoaded)?;
            let next = updater(copy).map_err(Into::into)?;
            state.working = Some(next);
            state.revision += 1;
            (state.revision, state.autosave_enabled && !state.preview_active)
        };
        if touch {
            self.signal(AutosaveSignal::Touch);
        }
        Ok(revision)
    }

    /// Hand-edit one field.
    pub fn set_path(&self, path: &PathAddress, value: Value) -> Result<u64, EditorError> {
        self.try_mutate(|doc| path::with_value(doc, path, value))
    }

    /// True when the working copy differs from the last loaded or saved baseline.
    pub fn is_dirty(&self) -> bool {
        let state = self.state();
        match (&state.working, &state.baseline) {
            (Some(working), Some(baseline)) => !baseline.matches(working),
            _ => false,
        }
    }

    /// Persist the working copy. On success it becomes the new baseline; on
    /// failure the baseline is untouched and the document stays dirty.
    pub async fn save(&self) -> Result<SaveReceipt, EditorError> {
        let _gate = self.shared.save_gate.lock().await;

        let doc = {
            let state = self.state();
            if state.preview_active {
                return Err(PreviewError::PreviewOpen.into());
            }
            state.working.clone().ok_or(EditorError::NotLoaded)?
        };

        let serialized =
            serde_json::to_string_pretty(&doc).map_err(|e| SaveError::Serialize(e.to_string()))?;
        let snapshot = Snapshot::capture(&doc);

        let receipt = self.shared.persistence.save(serialized).await.map_err(|error| {
            warn!(%error, "save failed; baseline unchanged");
            error
        })?;

        let mut state = self.state();
        state.baseline = Some(snapshot);
        state.last_saved_at = Some(receipt.timestamp);
        Ok(receipt)
    }

    /// Discard unsaved changes.
    pub fn revert_to_baseline(&self) -> Result<(), EditorError> {
        {
            let mut state = self.state();
            if state.preview_active {
                return Err(PreviewError::PreviewOpen.into());
            }
            let restored = state.baseline.as_ref().map(Snapshot::restore);
            state.working = Some(restored.ok_or(EditorError::NotLoaded)?);
            state.revision += 1;
        }
        self.signal(AutosaveSignal::Cancel);
        Ok(())
    }

    /// Toggle autosave. Never saves by itself; the next mutation schedules one.
    pub fn set_autosave(&self, enabled: bool) {
        self.state().autosave_enabled = enabled;
        if enabled {
            self.ensure_autosave_worker();
        } else {
            self.signal(AutosaveSignal::Cancel);
        }
        debug!(enabled, "autosave toggled");
    }

    pub fn autosave_enabled(&self) -> bool {
        self.state().autosave_enabled
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.state().last_saved_at
    }

    pub fn revision(&self) -> u64 {
        self.state().revision
    }

    pub fn preview_active(&self) -> bool {
        self.state().preview_active
    }

    // ── Preview hooks ──────────────────────────────────────────────

    /// Swap in `candidate` and return a backup of the prior working copy.
    pub(crate) fn begin_preview(&self, candidate: Value) -> Result<Snapshot, EditorError> {
        let backup = {
            let mut state = self.state();
            if state.preview_active {
                return Err(PreviewError::AlreadyPreviewing.into());
            }
            let current = state.working.as_ref().ok_or(EditorError::NotLoaded)?;
            let backup = Snapshot::capture(current);
            state.working = Some(candidate);
            state.preview_active = true;
            state.revision += 1;
            backup
        };
        self.signal(AutosaveSignal::Cancel);
        Ok(backup)
    }

    /// Put `backup` back exactly as it was captured.
    pub(crate) fn end_preview_reject(&self, backup: &Snapshot) -> Result<(), EditorError> {
        let touch = {
            let mut state = self.state();
            if !state.preview_active {
                return Err(PreviewError::NotPreviewing.into());
            }
            state.preview_active = false;
            state.revision += 1;
            let dirty =
                state.baseline.as_ref().is_some_and(|b| b.canonical() != backup.canonical());
            state.working = Some(backup.restore());
            state.autosave_enabled && dirty
        };
        if touch {
            self.signal(AutosaveSignal::Touch);
        }
        Ok(())
    }

    /// Keep the previewed document as the (dirty) working copy.
    pub(crate) fn end_preview_accept(&self) -> Result<(), EditorError> {
        let touch = {
            let mut state = self.state();
            if !state.preview_active {
                return Err(PreviewError::NotPreviewing.into());
            }
            state.preview_active = false;
            state.autosave_enabled
        };
        if touch {
            self.signal(AutosaveSignal::Touch);
        }
        Ok(())
    }

    // ── Internals ──────────────────────────────────────────────────

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn signal(&self, signal: AutosaveSignal) {
        let tx = self.shared.autosave_tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = tx.as_ref() {
            let _ = tx.send(signal);
        }
    }

    fn ensure_autosave_worker(&self) {
        let mut tx = self.shared.autosave_tx.lock().unwrap_or_else(PoisonError::into_inner);
        if tx.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return;
        }
        *tx = autosave::spawn_worker(Arc::downgrade(&self.shared), self.shared.autosave_delay);
        if tx.is_none() {
            warn!("no async runtime available; autosave will not run");
        }
    }

    /// Called by the autosave worker once the debounce window elapses.
    async fn autosave_now(&self) {
        let (enabled, previewing) = {
            let state = self.state();
            (state.autosave_enabled, state.preview_active)
        };
        if !enabled || previewing {
            debug!(enabled, previewing, "autosave skipped");
            return;
        }
        if !self.is_dirty() {
            debug!("autosave skipped; document is clean");
            return;
        }
        match self.save().await {
            Ok(receipt) => info!(timestamp = %receipt.timestamp, "autosaved"),
            Err(error) => warn!(%error, "autosave failed"),
        }
    }
}
