// Shared helpers for unit tests that need a live HTTP peer.

use std::sync::{Arc, Mutex};

use axum::Router;
use serde_json::Value;

use crate::error::SaveError;
use crate::persist::{PersistFuture, PersistenceAdapter, SaveReceipt};

/// Serve `router` on an ephemeral local port and return its base URL.
pub(crate) async fn serve(router: Router) -> String {
    let listener =
        tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("test listener should bind");
    let addr = listener.local_addr().expect("listener should have an address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server should run");
    });
    format!("http://{addr}")
}

/// Records every save; fails while `fail` is set.
#[derive(Default, Clone)]
pub(crate) struct RecordingPersistence {
    pub saved: Arc<Mutex<Vec<Value>>>,
    pub fail: Arc<Mutex<bool>>,
}

impl RecordingPersistence {
    pub fn save_count(&self) -> usize {
        self.saved.lock().unwrap().len()
    }

    pub fn last_saved(&self) -> Option<Value> {
        self.saved.lock().unwrap().last().cloned()
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

impl PersistenceAdapter for RecordingPersistence {
    fn save(&self, serialized: String) -> PersistFuture {
        let fail = *self.fail.lock().unwrap();
        let saved = Arc::clone(&self.saved);
        Box::pin(async move {
            if fail {
                return Err(SaveError::Transport("connection refused".into()));
            }
            let doc: Value = serde_json::from_str(&serialized)
                .map_err(|e| SaveError::Serialize(e.to_string()))?;
            saved.lock().unwrap().push(doc);
            Ok(SaveReceipt { backup_file: None, timestamp: chrono::Utc::now() })
        })
    }
}
