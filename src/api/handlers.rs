//! API route handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use tracing::{debug, info};

use crate::models::DisplayEntry;
use crate::replay::{SendOutcome, SendParams};
use crate::settings::{Settings, SettingsUpdate};
use crate::storage::{self, format, SessionExport, SessionImport};

use crate::api::error::Result;
use crate::api::state::AppState;

/// Liveness payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Log listing payload.
#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub data: Vec<DisplayEntry>,
}

/// Generic acknowledgement payload.
#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub status: &'static str,
    pub message: String,
}

/// GET /health - liveness probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// GET /api/proxy/logs - capture history in display shape. An unreadable
/// history file degrades to an empty listing.
pub async fn get_logs(State(state): State<AppState>) -> Json<LogsResponse> {
    let entries = state.store.load_or_empty().await;
    let data = entries.iter().map(format::to_display).collect();
    Json(LogsResponse { data })
}

/// POST /api/proxy/clear - drop all history, then restart the engine so
/// exchange state held by the capture hook is dropped with it.
pub async fn clear_logs(State(state): State<AppState>) -> Result<Json<StatusMessage>> {
    state.store.clear().await?;
    state.supervisor.restart().await?;
    info!("Capture history cleared");
    Ok(Json(StatusMessage {
        status: "ok",
        message: "Proxy logs cleared".to_string(),
    }))
}

/// DELETE /api/proxy/logs/{id} - delete one entry. Deleting an unknown id
/// is a no-op, not an error.
pub async fn delete_log(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<StatusMessage>> {
    let removed = state.store.delete_by_id(id).await?;
    if !removed {
        debug!("Delete requested for unknown log entry {id}");
    }
    Ok(Json(StatusMessage {
        status: "ok",
        message: format!("Log {id} deleted"),
    }))
}

/// GET /api/settings - current settings snapshot.
pub async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.settings.get().await)
}

/// POST /api/settings - sparse update; restarts the engine when a field it
/// reads has changed.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(patch): Json<SettingsUpdate>,
) -> Result<Json<Settings>> {
    let settings = state.settings.update(patch).await?;
    Ok(Json(settings))
}

/// POST /api/session/export - snapshot logs and settings.
pub async fn export_session(State(state): State<AppState>) -> Result<Json<SessionExport>> {
    let export = storage::export_session(&state.store, &state.settings).await?;
    Ok(Json(export))
}

/// POST /api/session/import - restore logs and settings from a snapshot.
pub async fn import_session(
    State(state): State<AppState>,
    Json(payload): Json<SessionImport>,
) -> Result<Json<StatusMessage>> {
    storage::import_session(&state.store, &state.settings, payload).await?;
    Ok(Json(StatusMessage {
        status: "ok",
        message: "Session imported successfully".to_string(),
    }))
}

/// POST /api/repeater/send - send a hand-edited request once.
pub async fn send_request(
    State(state): State<AppState>,
    Json(params): Json<SendParams>,
) -> Result<Json<SendOutcome>> {
    let outcome = state.repeater.send(params).await?;
    Ok(Json(outcome))
}
