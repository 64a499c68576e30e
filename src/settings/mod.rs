//! Live configuration and the validated update path
//!
//! Settings are loaded once at startup and afterwards mutated only through
//! [`SettingsController::update`], which decides whether a change requires an
//! engine restart and rolls the change back when that restart fails.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::engine::{EngineError, EngineSupervisor};

/// The client-visible slice of configuration: everything the control API may
/// read and patch at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Port the engine listens on for intercepted traffic
    pub proxy_port: u16,
    /// Port the local web UI is served from
    pub ui_port: u16,
    /// Control-plane log verbosity (DEBUG, INFO, WARNING, ERROR)
    pub debug_level: String,
    /// Whether capture filtering is enabled
    pub enable_filtering: bool,
    /// Capture filter rules, applied by the engine hook
    pub filter_rules: Vec<String>,
    pub upstream_proxy_enabled: bool,
    pub upstream_proxy_host: Option<String>,
    pub upstream_proxy_port: Option<u16>,
    pub upstream_proxy_auth: bool,
    pub upstream_proxy_username: Option<String>,
    pub upstream_proxy_password: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            proxy_port: 8080,
            ui_port: 3001,
            debug_level: "DEBUG".to_string(),
            enable_filtering: false,
            filter_rules: Vec::new(),
            upstream_proxy_enabled: false,
            upstream_proxy_host: None,
            upstream_proxy_port: None,
            upstream_proxy_auth: false,
            upstream_proxy_username: None,
            upstream_proxy_password: None,
        }
    }
}

/// Sparse settings patch: absent fields leave the current value untouched.
/// Unknown fields are rejected at deserialization time.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsUpdate {
    pub proxy_port: Option<u16>,
    pub ui_port: Option<u16>,
    pub debug_level: Option<String>,
    pub enable_filtering: Option<bool>,
    pub filter_rules: Option<Vec<String>>,
    pub upstream_proxy_enabled: Option<bool>,
    pub upstream_proxy_host: Option<String>,
    pub upstream_proxy_port: Option<u16>,
    pub upstream_proxy_auth: Option<bool>,
    pub upstream_proxy_username: Option<String>,
    pub upstream_proxy_password: Option<String>,
}

impl Settings {
    /// Field-by-field merge of a sparse patch onto this snapshot.
    pub fn merged(&self, patch: &SettingsUpdate) -> Settings {
        let mut next = self.clone();
        if let Some(proxy_port) = patch.proxy_port {
            next.proxy_port = proxy_port;
        }
        if let Some(ui_port) = patch.ui_port {
            next.ui_port = ui_port;
        }
        if let Some(debug_level) = &patch.debug_level {
            next.debug_level = debug_level.clone();
        }
        if let Some(enable_filtering) = patch.enable_filtering {
            next.enable_filtering = enable_filtering;
        }
        if let Some(filter_rules) = &patch.filter_rules {
            next.filter_rules = filter_rules.clone();
        }
        if let Some(enabled) = patch.upstream_proxy_enabled {
            next.upstream_proxy_enabled = enabled;
        }
        if let Some(host) = &patch.upstream_proxy_host {
            next.upstream_proxy_host = Some(host.clone());
        }
        if let Some(port) = patch.upstream_proxy_port {
            next.upstream_proxy_port = Some(port);
        }
        if let Some(auth) = patch.upstream_proxy_auth {
            next.upstream_proxy_auth = auth;
        }
        if let Some(username) = &patch.upstream_proxy_username {
            next.upstream_proxy_username = Some(username.clone());
        }
        if let Some(password) = &patch.upstream_proxy_password {
            next.upstream_proxy_password = Some(password.clone());
        }
        next
    }
}

/// Whether the difference between two snapshots touches anything the running
/// engine was launched with.
fn engine_fields_changed(before: &Settings, after: &Settings) -> bool {
    before.proxy_port != after.proxy_port
        || before.upstream_proxy_enabled != after.upstream_proxy_enabled
        || before.upstream_proxy_host != after.upstream_proxy_host
        || before.upstream_proxy_port != after.upstream_proxy_port
        || before.upstream_proxy_auth != after.upstream_proxy_auth
        || before.upstream_proxy_username != after.upstream_proxy_username
        || before.upstream_proxy_password != after.upstream_proxy_password
}

/// Shared live settings value. Cloning shares the same underlying snapshot.
/// Only the controller writes it; everything else takes snapshots.
#[derive(Clone)]
pub struct SharedSettings {
    inner: Arc<RwLock<Settings>>,
}

impl SharedSettings {
    pub fn new(initial: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub async fn snapshot(&self) -> Settings {
        self.inner.read().await.clone()
    }

    async fn replace(&self, settings: Settings) {
        *self.inner.write().await = settings;
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("engine restart after settings change failed ({0}); settings were reverted")]
    RestartFailed(EngineError),
    #[error("engine restart failed ({original}) and the recovery restart with reverted settings also failed ({recovery}); engine left stopped")]
    RecoveryFailed {
        original: EngineError,
        recovery: EngineError,
    },
}

/// Owns all settings mutation. Updates are serialized so two concurrent
/// patches can never interleave their restarts.
pub struct SettingsController {
    shared: SharedSettings,
    supervisor: Arc<EngineSupervisor>,
    update_gate: Mutex<()>,
}

impl SettingsController {
    pub fn new(shared: SharedSettings, supervisor: Arc<EngineSupervisor>) -> Self {
        Self {
            shared,
            supervisor,
            update_gate: Mutex::new(()),
        }
    }

    pub async fn get(&self) -> Settings {
        self.shared.snapshot().await
    }

    /// Apply a sparse patch. A change to the listen port or any upstream
    /// field restarts the engine; if that restart fails, every touched field
    /// is reverted and the engine is restarted once more with the old
    /// configuration before the failure is reported.
    pub async fn update(&self, patch: SettingsUpdate) -> Result<Settings, SettingsError> {
        let _gate = self.update_gate.lock().await;
        let before = self.shared.snapshot().await;
        let after = before.merged(&patch);
        let needs_restart = engine_fields_changed(&before, &after);

        self.shared.replace(after.clone()).await;
        if !needs_restart {
            debug!("Settings updated without engine-facing changes");
            return Ok(after);
        }

        info!("Settings change affects the engine, restarting it");
        match self.supervisor.restart().await {
            Ok(()) => Ok(after),
            Err(original) => {
                error!("Engine restart with updated settings failed: {original}");
                self.shared.replace(before).await;
                match self.supervisor.restart().await {
                    Ok(()) => {
                        info!("Engine recovered with reverted settings");
                        Err(SettingsError::RestartFailed(original))
                    }
                    Err(recovery) => {
                        error!("Recovery restart with reverted settings failed: {recovery}");
                        Err(SettingsError::RecoveryFailed { original, recovery })
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use serde_json::json;
    use tempfile::TempDir;

    fn controller_with_bin(dir: &TempDir, bin: &str) -> SettingsController {
        let hook = dir.path().join("hook.py");
        std::fs::write(&hook, "# capture hook\n").unwrap();
        let config = EngineConfig {
            bin: bin.to_string(),
            listen_host: "127.0.0.1".to_string(),
            session_dir: dir.path().join("session"),
            hook_path: hook,
        };
        let shared = SharedSettings::new(Settings::default());
        let supervisor = Arc::new(EngineSupervisor::new(config, shared.clone()));
        SettingsController::new(shared, supervisor)
    }

    /// Shell script that records each launch, then stays alive.
    #[cfg(unix)]
    fn counting_engine(dir: &TempDir) -> (String, std::path::PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let starts = dir.path().join("starts.txt");
        let path = dir.path().join("fake-engine");
        let script = format!(
            "#!/bin/sh\necho started >> {}\nexec sleep 30\n",
            starts.display()
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        (path.display().to_string(), starts)
    }

    /// Shell script that fails its first launch and succeeds afterwards.
    #[cfg(unix)]
    fn fail_once_engine(dir: &TempDir) -> String {
        use std::os::unix::fs::PermissionsExt;

        let marker = dir.path().join("attempted");
        let path = dir.path().join("flaky-engine");
        let script = format!(
            "#!/bin/sh\nif [ ! -e {marker} ]; then\n  touch {marker}\n  exit 1\nfi\nexec sleep 30\n",
            marker = marker.display()
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[cfg(unix)]
    fn start_count(path: &std::path::Path) -> usize {
        std::fs::read_to_string(path)
            .map(|raw| raw.lines().count())
            .unwrap_or(0)
    }

    #[test]
    fn merge_applies_only_present_fields() {
        let base = Settings::default();
        let patch = SettingsUpdate {
            debug_level: Some("INFO".to_string()),
            upstream_proxy_host: Some("upstream.local".to_string()),
            ..Default::default()
        };

        let merged = base.merged(&patch);
        assert_eq!(merged.debug_level, "INFO");
        assert_eq!(merged.upstream_proxy_host.as_deref(), Some("upstream.local"));
        assert_eq!(merged.proxy_port, base.proxy_port);
        assert_eq!(merged.ui_port, base.ui_port);
    }

    #[test]
    fn unknown_patch_fields_are_rejected() {
        let result: Result<SettingsUpdate, _> =
            serde_json::from_value(json!({"proxy_port": 9000, "bogus": true}));
        assert!(result.is_err());
    }

    #[test]
    fn patch_with_known_fields_deserializes() {
        let patch: SettingsUpdate =
            serde_json::from_value(json!({"proxy_port": 9000, "debug_level": "INFO"})).unwrap();
        assert_eq!(patch.proxy_port, Some(9000));
        assert_eq!(patch.debug_level.as_deref(), Some("INFO"));
    }

    #[tokio::test]
    async fn non_engine_fields_update_without_restart() {
        let dir = TempDir::new().unwrap();
        // A broken engine binary proves no restart was attempted.
        let controller = controller_with_bin(&dir, "proxywarden-nonexistent-engine");

        let patch = SettingsUpdate {
            debug_level: Some("INFO".to_string()),
            ui_port: Some(3002),
            enable_filtering: Some(true),
            ..Default::default()
        };
        let updated = controller.update(patch).await.unwrap();

        assert_eq!(updated.debug_level, "INFO");
        assert_eq!(updated.ui_port, 3002);
        assert!(updated.enable_filtering);
        assert_eq!(controller.get().await, updated);
    }

    #[tokio::test]
    async fn unchanged_engine_fields_do_not_restart() {
        let dir = TempDir::new().unwrap();
        let controller = controller_with_bin(&dir, "proxywarden-nonexistent-engine");

        // Same value as the current snapshot, so nothing engine-facing moved.
        let patch = SettingsUpdate {
            proxy_port: Some(Settings::default().proxy_port),
            ..Default::default()
        };
        controller.update(patch).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn port_change_restarts_the_engine_exactly_once() {
        let dir = TempDir::new().unwrap();
        let (bin, starts) = counting_engine(&dir);
        let controller = controller_with_bin(&dir, &bin);

        let patch = SettingsUpdate {
            proxy_port: Some(9090),
            ..Default::default()
        };
        let updated = controller.update(patch).await.unwrap();

        assert_eq!(updated.proxy_port, 9090);
        assert_eq!(start_count(&starts), 1);

        controller.supervisor.stop().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn upstream_change_restarts_the_engine() {
        let dir = TempDir::new().unwrap();
        let (bin, starts) = counting_engine(&dir);
        let controller = controller_with_bin(&dir, &bin);

        let patch = SettingsUpdate {
            upstream_proxy_enabled: Some(true),
            upstream_proxy_host: Some("upstream.local".to_string()),
            upstream_proxy_port: Some(3128),
            ..Default::default()
        };
        controller.update(patch).await.unwrap();
        assert_eq!(start_count(&starts), 1);

        controller.supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn failed_restart_reverts_the_settings() {
        let dir = TempDir::new().unwrap();
        let controller = controller_with_bin(&dir, "proxywarden-nonexistent-engine");
        let original_port = controller.get().await.proxy_port;

        let patch = SettingsUpdate {
            proxy_port: Some(9999),
            ..Default::default()
        };
        let err = controller.update(patch).await.unwrap_err();

        // Both the restart and the recovery restart fail with a missing
        // binary, which is the fatal double-failure case.
        assert!(matches!(err, SettingsError::RecoveryFailed { .. }));
        assert_eq!(controller.get().await.proxy_port, original_port);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn recovery_restart_reports_the_original_failure() {
        let dir = TempDir::new().unwrap();
        let bin = fail_once_engine(&dir);
        let controller = controller_with_bin(&dir, &bin);

        let patch = SettingsUpdate {
            proxy_port: Some(9999),
            ..Default::default()
        };
        let err = controller.update(patch).await.unwrap_err();

        assert!(matches!(err, SettingsError::RestartFailed(_)));
        assert_eq!(controller.get().await.proxy_port, Settings::default().proxy_port);
        // The recovery restart brought the engine back up.
        assert!(controller.supervisor.is_running().await);

        controller.supervisor.stop().await.unwrap();
    }
}
