// Design persistence routes.
//
// POST /api/save-design   { serializedDocument } -> { success, backupFile, timestamp }
// GET  /design.json       current durable copy

use std::sync::Arc;

use atelier_common::protocol::persist::{SaveRequest, SaveResponse};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE},
        StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::backup::DesignFile;
use crate::error::{ErrorCode, PersistError};

#[derive(Clone)]
pub struct AppState {
    design: Arc<DesignFile>,
    /// Serializes backup-then-write sequences.
    write_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(design: DesignFile) -> Self {
        Self { design: Arc::new(design), write_lock: Arc::new(Mutex::new(())) }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/save-design", post(save_design))
        .route("/design.json", get(get_design))
        .with_state(state)
}

async fn save_design(
    State(state): State<AppState>,
    payload: Result<Json<SaveRequest>, JsonRejection>,
) -> Result<Json<SaveResponse>, PersistError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "rejected save request");
        let code = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ErrorCode::PayloadTooLarge
        } else {
            ErrorCode::ValidationFailed
        };
        PersistError::new(code, rejection.body_text())
    })?;

    validate_document(&request.serialized_document)?;

    let _guard = state.write_lock.lock().await;
    let design = Arc::clone(&state.design);
    let contents = request.serialized_document;
    let timestamp = Utc::now();
    let outcome = tokio::task::spawn_blocking(move || design.save(&contents, timestamp))
        .await
        .map_err(|join_error| {
            error!(?join_error, "save task failed");
            PersistError::from_code(ErrorCode::InternalError)
        })?
        .map_err(|save_error| {
            error!(error = %save_error, "failed to persist design");
            PersistError::new(ErrorCode::DiskWriteFailed, save_error.to_string())
        })?;

    Ok(Json(SaveResponse { success: true, backup_file: outcome.backup_file, timestamp }))
}

fn validate_document(serialized: &str) -> Result<(), PersistError> {
    let parsed: Value = serde_json::from_str(serialized).map_err(|error| {
        PersistError::new(
            ErrorCode::ValidationFailed,
            format!("serializedDocument is not valid JSON: {error}"),
        )
    })?;
    if !parsed.is_object() {
        return Err(PersistError::new(
            ErrorCode::ValidationFailed,
            "serializedDocument must be a JSON object",
        ));
    }
    Ok(())
}

async fn get_design(State(state): State<AppState>) -> Result<Response, PersistError> {
    let design = Arc::clone(&state.design);
    let contents = tokio::task::spawn_blocking(move || design.read())
        .await
        .map_err(|_| PersistError::from_code(ErrorCode::InternalError))?
        .map_err(|read_error| {
            error!(error = %read_error, "failed to read design");
            PersistError::from_code(ErrorCode::InternalError)
        })?
        .ok_or_else(|| PersistError::new(ErrorCode::NotFound, "no design has been saved yet"))?;

    Ok(([(CONTENT_TYPE, "application/json"), (CACHE_CONTROL, "no-store")], contents)
        .into_response())
}
