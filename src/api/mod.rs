//! Control API
//!
//! The HTTP surface consumed by the Proxywarden UI.
//!
//! ## Endpoints
//!
//! - `GET /health` - liveness probe
//! - `GET /api/proxy/logs` - capture history in display shape
//! - `POST /api/proxy/clear` - clear history and restart the engine
//! - `DELETE /api/proxy/logs/{id}` - delete one history entry
//! - `GET /api/settings` - current settings
//! - `POST /api/settings` - sparse settings update
//! - `POST /api/session/export` - snapshot logs and settings
//! - `POST /api/session/import` - restore a snapshot
//! - `POST /api/repeater/send` - send a hand-edited request once

pub mod error;
mod handlers;
pub mod state;

use std::future::Future;
use std::net::SocketAddr;

use anyhow::Context;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use error::{ApiError, Result};
pub use state::AppState;

/// Build the API router. CORS is wide open because the UI is served from
/// its own port during development.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/proxy/logs", get(handlers::get_logs))
        .route("/api/proxy/logs/{id}", delete(handlers::delete_log))
        .route("/api/proxy/clear", post(handlers::clear_logs))
        .route(
            "/api/settings",
            get(handlers::get_settings).post(handlers::update_settings),
        )
        .route("/api/session/export", post(handlers::export_session))
        .route("/api/session/import", post(handlers::import_session))
        .route("/api/repeater/send", post(handlers::send_request))
        .layer(cors)
        .with_state(state)
}

/// Serve the control API until the shutdown future resolves.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding control API to {addr}"))?;
    info!("Control API listening on {addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("control API server")?;
    Ok(())
}
