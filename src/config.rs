//! Startup configuration
//!
//! Values fixed for the lifetime of the process, read once from
//! `WARDEN_`-prefixed environment variables over hard defaults. Anything an
//! operator can change at runtime lives in [`crate::settings`] instead.

use std::path::PathBuf;

use tracing::warn;

use crate::engine::EngineConfig;
use crate::settings::Settings;

/// Process-lifetime configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Control API bind host
    pub api_host: String,
    /// Control API bind port
    pub api_port: u16,
    /// Proxy engine listen host
    pub proxy_host: String,
    /// Initial proxy engine listen port, updatable through settings
    pub proxy_port: u16,
    /// UI dev server port, reported back through settings
    pub ui_port: u16,
    /// Engine log verbosity label (DEBUG, INFO, WARNING, ERROR)
    pub debug_level: String,
    /// Directory holding the history file and the engine log
    pub session_dir: PathBuf,
    /// Proxy engine executable
    pub engine_bin: String,
    /// Capture hook script handed to the engine
    pub engine_hook: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_host: "0.0.0.0".to_string(),
            api_port: 8001,
            proxy_host: "0.0.0.0".to_string(),
            proxy_port: 8080,
            ui_port: 3001,
            debug_level: "DEBUG".to_string(),
            session_dir: PathBuf::from("sessions"),
            engine_bin: "mitmdump".to_string(),
            engine_hook: PathBuf::from("hooks/capture.py"),
        }
    }
}

impl AppConfig {
    /// Read configuration from `WARDEN_*` environment variables, falling
    /// back to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_host: env_string("WARDEN_API_HOST", defaults.api_host),
            api_port: env_port("WARDEN_API_PORT", defaults.api_port),
            proxy_host: env_string("WARDEN_PROXY_HOST", defaults.proxy_host),
            proxy_port: env_port("WARDEN_PROXY_PORT", defaults.proxy_port),
            ui_port: env_port("WARDEN_UI_PORT", defaults.ui_port),
            debug_level: env_string("WARDEN_DEBUG_LEVEL", defaults.debug_level),
            session_dir: env_path("WARDEN_SESSION_DIR", defaults.session_dir),
            engine_bin: env_string("WARDEN_ENGINE_BIN", defaults.engine_bin),
            engine_hook: env_path("WARDEN_ENGINE_HOOK", defaults.engine_hook),
        }
    }

    /// Settings the process boots with, before any API updates.
    pub fn initial_settings(&self) -> Settings {
        Settings {
            proxy_port: self.proxy_port,
            ui_port: self.ui_port,
            debug_level: self.debug_level.clone(),
            ..Settings::default()
        }
    }

    /// Launch configuration for the engine supervisor.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            bin: self.engine_bin.clone(),
            listen_host: self.proxy_host.clone(),
            session_dir: self.session_dir.clone(),
            hook_path: self.engine_hook.clone(),
        }
    }

    /// Control API bind address, host and port joined.
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

fn env_string(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_path(name: &str, default: PathBuf) -> PathBuf {
    std::env::var(name).map(PathBuf::from).unwrap_or(default)
}

fn env_port(name: &str, default: u16) -> u16 {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring unparseable {name}={raw:?}, using {default}");
            default
        }),
        Err(_) => default,
    }
}
