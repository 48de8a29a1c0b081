// Persistence adapter: hands serialized documents to the local save service.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use atelier_common::protocol::persist::{SaveRequest, SaveResponse};
use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::{info, warn};

use crate::config::EditorConfig;
use crate::error::{clip_body, SaveError};

const SAVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Proof of a durable write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReceipt {
    /// Name of the rotated backup, if a prior copy existed.
    pub backup_file: Option<String>,
    pub timestamp: DateTime<Utc>,
}

pub type PersistFuture = Pin<Box<dyn Future<Output = Result<SaveReceipt, SaveError>> + Send>>;

/// Durable storage for the working document.
///
/// The store calls this with the canonical serialization; tests inject an
/// in-memory recorder.
pub trait PersistenceAdapter: Send + Sync {
    fn save(&self, serialized: String) -> PersistFuture;
}

/// `POST { serializedDocument }` to the persistence service.
#[derive(Debug, Clone)]
pub struct HttpPersistence {
    client: Client,
    url: String,
}

impl HttpPersistence {
    pub fn new(url: impl Into<String>) -> Result<Self, SaveError> {
        let client = Client::builder()
            .timeout(SAVE_TIMEOUT)
            .build()
            .map_err(|e| SaveError::Transport(e.to_string()))?;
        Ok(Self { client, url: url.into() })
    }

    pub fn from_config(config: &EditorConfig) -> Result<Self, SaveError> {
        Self::new(config.endpoints.save_url.clone())
    }
}

impl PersistenceAdapter for HttpPersistence {
    fn save(&self, serialized: String) -> PersistFuture {
        let client = self.client.clone();
        let url = self.url.clone();
        Box::pin(async move { post_save(&client, &url, serialized).await })
    }
}

async fn post_save(
    client: &Client,
    url: &str,
    serialized: String,
) -> Result<SaveReceipt, SaveError> {
    let bytes = serialized.len();
    let request = SaveRequest { serialized_document: serialized };
    let response = client
        .post(url)
        .json(&request)
        .send()
        .await
        .map_err(|e| SaveError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(url, status = status.as_u16(), "save rejected by persistence service");
        return Err(SaveError::Status { status: status.as_u16(), body: clip_body(&body) });
    }

    let reply: SaveResponse =
        response.json().await.map_err(|e| SaveError::Decode(e.to_string()))?;
    if !reply.success {
        return Err(SaveError::Rejected);
    }

    info!(bytes, backup = reply.backup_file.as_deref().unwrap_or("-"), "document persisted");
    Ok(SaveReceipt { backup_file: reply.backup_file, timestamp: reply.timestamp })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;
    use crate::test_support::serve;

    #[tokio::test]
    async fn posts_serialized_document_and_reads_receipt() {
        let seen: Arc<Mutex<Option<Value>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let base = serve(Router::new().route(
            "/api/save-design",
            post(move |Json(body): Json<Value>| {
                let sink = Arc::clone(&sink);
                async move {
                    *sink.lock().unwrap() = Some(body);
                    Json(json!({
                        "success": true,
                        "backupFile": "design-20260101T000000000Z.json",
                        "timestamp": "2026-01-01T00:00:00Z"
                    }))
                }
            }),
        ))
        .await;

        let adapter = HttpPersistence::new(format!("{base}/api/save-design")).unwrap();
        let receipt = adapter.save("{\"colors\":{}}".into()).await.expect("save should succeed");

        assert_eq!(receipt.backup_file.as_deref(), Some("design-20260101T000000000Z.json"));
        let body = seen.lock().unwrap().clone().expect("server should see a body");
        assert_eq!(body, json!({ "serializedDocument": "{\"colors\":{}}" }));
    }

    #[tokio::test]
    async fn non_2xx_is_a_save_failure() {
        let base = serve(Router::new().route(
            "/api/save-design",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "disk full") }),
        ))
        .await;

        let adapter = HttpPersistence::new(format!("{base}/api/save-design")).unwrap();
        let err = adapter.save("{}".into()).await.unwrap_err();
        assert!(
            matches!(err, SaveError::Status { status: 500, ref body } if body == "disk full"),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn unsuccessful_reply_is_rejected() {
        let base = serve(Router::new().route(
            "/api/save-design",
            post(|| async {
                Json(json!({ "success": false, "timestamp": "2026-01-01T00:00:00Z" }))
            }),
        ))
        .await;

        let adapter = HttpPersistence::new(format!("{base}/api/save-design")).unwrap();
        assert!(matches!(adapter.save("{}".into()).await, Err(SaveError::Rejected)));
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_failure() {
        let adapter = HttpPersistence::new("http://127.0.0.1:9/api/save-design").unwrap();
        assert!(matches!(adapter.save("{}".into()).await, Err(SaveError::Transport(_))));
    }
}
