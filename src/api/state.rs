//! Shared state for the control API.

use std::sync::Arc;

use crate::engine::EngineSupervisor;
use crate::replay::Repeater;
use crate::settings::SettingsController;
use crate::storage::HistoryStore;

/// Everything a handler can reach. Cloned per request by axum.
#[derive(Clone)]
pub struct AppState {
    /// Capture history on disk.
    pub store: Arc<HistoryStore>,
    /// Live settings and their update path.
    pub settings: Arc<SettingsController>,
    /// Proxy engine process lifecycle.
    pub supervisor: Arc<EngineSupervisor>,
    /// Manual request replay.
    pub repeater: Arc<Repeater>,
}

impl AppState {
    pub fn new(
        store: Arc<HistoryStore>,
        settings: Arc<SettingsController>,
        supervisor: Arc<EngineSupervisor>,
        repeater: Arc<Repeater>,
    ) -> Self {
        Self {
            store,
            settings,
            supervisor,
            repeater,
        }
    }
}
