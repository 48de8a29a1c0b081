// Trailing-edge autosave.
//
// Mutations send `Touch`; the worker saves once the document has been quiet
// for the debounce window. Touches inside the window push the deadline out,
// so a burst of edits produces a single save.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use super::{DocumentStore, StoreShared};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AutosaveSignal {
    /// The working copy changed.
    Touch,
    /// Drop any pending save (revert, reload, preview, disable).
    Cancel,
}

/// Single-slot trailing debouncer.
#[derive(Debug)]
pub(crate) struct SaveDebouncer {
    window: Duration,
    last_touch: Option<Instant>,
}

impl SaveDebouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last_touch: None }
    }

    pub fn touch(&mut self) {
        self.touch_at(Instant::now());
    }

    /// Like `touch` but with a specific timestamp (for testing).
    fn touch_at(&mut self, now: Instant) {
        self.last_touch = Some(now);
    }

    /// When the pending save becomes due, or `None` when idle.
    pub fn deadline(&self) -> Option<Instant> {
        self.last_touch.map(|touched| touched + self.window)
    }

    /// Consume the pending save if its window has elapsed.
    fn take_ready_at(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(deadline) if now >= deadline => {
                self.last_touch = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.last_touch = None;
    }

    pub fn is_pending(&self) -> bool {
        self.last_touch.is_some()
    }
}

/// Start the autosave worker on the current runtime.
///
/// The worker holds only a weak reference; it exits once the store is
/// dropped and its sender closes.
pub(crate) fn spawn_worker(
    shared: Weak<StoreShared>,
    window: Duration,
) -> Option<mpsc::UnboundedSender<AutosaveSignal>> {
    let handle = tokio::runtime::Handle::try_current().ok()?;
    let (tx, rx) = mpsc::unbounded_channel();
    handle.spawn(run_worker(shared, rx, window));
    Some(tx)
}

async fn run_worker(
    shared: Weak<StoreShared>,
    mut rx: mpsc::UnboundedReceiver<AutosaveSignal>,
    window: Duration,
) {
    let mut debouncer = SaveDebouncer::new(window);
    loop {
        let deadline = debouncer.deadline();
        tokio::select! {
            signal = rx.recv() => match signal {
                Some(AutosaveSignal::Touch) => debouncer.touch(),
                Some(AutosaveSignal::Cancel) => debouncer.cancel(),
                None => break,
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if !debouncer.take_ready_at(Instant::now()) {
                    continue;
                }
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                DocumentStore { shared }.autosave_now().await;
            }
        }
    }
    debug!("autosave worker stopped");
}
