//! Proxywarden control plane daemon.
//!
//! Boots the proxy engine, then serves the control API until SIGINT or
//! SIGTERM arrives, stopping the engine on the way out.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use proxywarden::api::{self, AppState};
use proxywarden::config::AppConfig;
use proxywarden::engine::EngineSupervisor;
use proxywarden::replay::Repeater;
use proxywarden::settings::{SettingsController, SharedSettings};
use proxywarden::storage::HistoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();
    init_tracing(&config);

    info!("Proxywarden v{} starting", proxywarden::VERSION);

    let engine_config = config.engine_config();
    let store = Arc::new(HistoryStore::new(engine_config.history_file()));
    let shared = SharedSettings::new(config.initial_settings());
    let supervisor = Arc::new(EngineSupervisor::new(engine_config, shared.clone()));
    let settings = Arc::new(SettingsController::new(shared, supervisor.clone()));
    let repeater = Arc::new(Repeater::new(store.clone()));

    supervisor
        .start()
        .await
        .context("starting the proxy engine")?;

    let state = AppState::new(store, settings, supervisor.clone(), repeater);
    let addr: SocketAddr = config
        .api_addr()
        .parse()
        .with_context(|| format!("invalid control API address {:?}", config.api_addr()))?;

    let served = api::serve(addr, state, shutdown_signal()).await;

    if let Err(err) = supervisor.stop().await {
        warn!("Engine stop during shutdown failed: {err}");
    }
    info!("Proxywarden stopped");
    served
}

fn init_tracing(config: &AppConfig) {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", default_level(&config.debug_level));
    }

    // Debug builds log to the console; release builds to a rolling file.
    #[cfg(debug_assertions)]
    {
        let level = resolve_log_level();
        let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
    }

    #[cfg(not(debug_assertions))]
    {
        let level = resolve_log_level();
        let log_dir = config.session_dir.join("logs");
        if let Err(err) = std::fs::create_dir_all(&log_dir) {
            eprintln!(
                "Failed to create log directory {}: {err}",
                log_dir.display()
            );
            let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
            return;
        }

        let file_appender = tracing_appender::rolling::daily(&log_dir, "proxywarden");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Keep the guard alive for the lifetime of the program so buffered
        // lines flush until exit.
        std::mem::forget(guard);

        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(non_blocking)
            .with_ansi(false)
            .try_init();
    }
}

fn resolve_log_level() -> tracing::level_filters::LevelFilter {
    use tracing::level_filters::LevelFilter;

    match std::env::var("RUST_LOG") {
        Ok(val) => match val.to_lowercase().as_str() {
            "trace" => LevelFilter::TRACE,
            "debug" => LevelFilter::DEBUG,
            "info" => LevelFilter::INFO,
            "warn" | "warning" => LevelFilter::WARN,
            "error" => LevelFilter::ERROR,
            "off" => LevelFilter::OFF,
            _ => LevelFilter::INFO,
        },
        Err(_) => LevelFilter::INFO,
    }
}

/// RUST_LOG value matching a configured engine debug level.
fn default_level(debug_level: &str) -> &'static str {
    match debug_level.to_ascii_uppercase().as_str() {
        "TRACE" | "DEBUG" => "debug",
        "INFO" => "info",
        "WARN" | "WARNING" => "warn",
        "ERROR" => "error",
        _ => "info",
    }
}

/// Wait for a shutdown signal: SIGINT or SIGTERM on Unix, Ctrl+C elsewhere.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint =
            signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");
        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, shutting down");
    }
}
