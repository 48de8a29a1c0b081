// Document sources.
//
// `DocumentSource` backs the editable store and never substitutes data on
// failure. `TokensSource` serves read-only display tokens and falls back to
// the bundled default document instead of failing.

use std::future::Future;
use std::pin::Pin;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use atelier_common::schema::parse_document;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::EditorConfig;
use crate::error::LoadError;

const BUNDLED_DEFAULT: &str = include_str!("../assets/default_design.json");

/// The bundled default design document.
pub fn bundled_default() -> &'static Value {
    static DEFAULT: OnceLock<Value> = OnceLock::new();
    DEFAULT.get_or_init(|| {
        serde_json::from_str(BUNDLED_DEFAULT).expect("bundled default design should be valid JSON")
    })
}

/// Fetches the editable working document.
///
/// Implementations return an already unwrapped and validated document.
pub trait DocumentSource: Send + Sync {
    fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<Value, LoadError>> + Send>>;
}

/// `GET` a document over HTTP.
#[derive(Debug, Clone)]
pub struct HttpDocumentSource {
    client: Client,
    url: String,
}

impl HttpDocumentSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, LoadError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LoadError::Transport(e.to_string()))?;
        Ok(Self { client, url: url.into() })
    }

    pub fn from_config(config: &EditorConfig) -> Result<Self, LoadError> {
        Self::new(config.endpoints.document_url.clone(), config.load_timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl DocumentSource for HttpDocumentSource {
    fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<Value, LoadError>> + Send>> {
        let client = self.client.clone();
        let url = self.url.clone();
        Box::pin(async move { fetch_document(&client, &url).await })
    }
}

async fn fetch_document(client: &Client, url: &str) -> Result<Value, LoadError> {
    let started = Instant::now();
    let response = client.get(url).send().await.map_err(transport_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(LoadError::Status { status: status.as_u16() });
    }

    let bytes = response.bytes().await.map_err(transport_error)?;
    let body: Value =
        serde_json::from_slice(&bytes).map_err(|e| LoadError::Decode(e.to_string()))?;
    let doc = parse_document(body)?;

    debug!(
        url,
        bytes = bytes.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "fetched design document"
    );
    Ok(doc)
}

fn transport_error(error: reqwest::Error) -> LoadError {
    if error.is_timeout() {
        LoadError::Timeout
    } else {
        LoadError::Transport(error.to_string())
    }
}

/// Read-only design tokens for display surfaces.
pub struct TokensSource {
    inner: Box<dyn DocumentSource>,
}

impl TokensSource {
    pub fn new(inner: impl DocumentSource + 'static) -> Self {
        Self { inner: Box::new(inner) }
    }

    pub fn from_config(config: &EditorConfig) -> Result<Self, LoadError> {
        let url = config.endpoints.tokens_url.clone();
        Ok(Self::new(HttpDocumentSource::new(url, config.load_timeout())?))
    }

    /// Fetch tokens, returning the bundled default on any failure.
    pub async fn fetch_or_default(&self) -> Value {
        match self.inner.fetch().await {
            Ok(doc) => doc,
            Err(error) => {
                warn!(%error, "design tokens unavailable; using bundled default");
                bundled_default().clone()
            }
        }
    }
}
