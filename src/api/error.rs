//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::engine::EngineError;
use crate::replay::ReplayError;
use crate::settings::SettingsError;
use crate::storage::{HistoryError, SessionError};

/// API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// History store error.
    #[error("history error: {0}")]
    History(#[from] HistoryError),

    /// Engine lifecycle error.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Settings update error.
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    /// Session export/import error.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Replay error.
    #[error("replay error: {0}")]
    Replay(#[from] ReplayError),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::History(_) => (StatusCode::INTERNAL_SERVER_ERROR, "history_error"),
            ApiError::Engine(_) => (StatusCode::INTERNAL_SERVER_ERROR, "engine_error"),
            ApiError::Settings(_) => (StatusCode::INTERNAL_SERVER_ERROR, "settings_error"),
            // A payload problem is the client's fault; everything else on the
            // session path is ours.
            ApiError::Session(SessionError::Entry { .. }) => {
                (StatusCode::BAD_REQUEST, "invalid_session")
            }
            ApiError::Session(_) => (StatusCode::INTERNAL_SERVER_ERROR, "session_error"),
            ApiError::Replay(ReplayError::History(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "replay_error")
            }
            ApiError::Replay(_) => (StatusCode::BAD_REQUEST, "replay_error"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;
