//! Session snapshot and restore
//!
//! A session bundles the full capture history (in display shape) with the
//! live settings so an operator can park an investigation and pick it up
//! later, possibly on another machine.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::models::DisplayEntry;
use crate::settings::{Settings, SettingsController, SettingsError, SettingsUpdate};
use crate::storage::format::{self, MalformedEntry};
use crate::storage::history::{HistoryError, HistoryStore};

#[derive(Debug, Serialize)]
pub struct SessionExport {
    pub logs: Vec<DisplayEntry>,
    pub settings: Settings,
    pub timestamp: String,
}

/// Incoming session payload. Both halves are optional so a session file can
/// carry only logs or only settings; entries may be in the nested or the
/// legacy flat shape.
#[derive(Debug, Deserialize)]
pub struct SessionImport {
    #[serde(default)]
    pub logs: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub settings: Option<SettingsUpdate>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session history could not be read")]
    History(#[from] HistoryError),
    #[error("entry {index} in the imported session is invalid: {source}")]
    Entry {
        index: usize,
        source: MalformedEntry,
    },
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Snapshot history and settings into one payload. Unlike the listing path,
/// an unreadable history is an error here: exporting must not silently
/// produce an empty session from a corrupt file.
pub async fn export_session(
    store: &HistoryStore,
    settings: &SettingsController,
) -> Result<SessionExport, SessionError> {
    let entries = store.load_all().await?;
    let logs: Vec<DisplayEntry> = entries.iter().map(format::to_display).collect();
    let snapshot = settings.get().await;

    info!("Exporting session with {} log entries", logs.len());
    Ok(SessionExport {
        logs,
        settings: snapshot,
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Restore a session. All log entries are normalized before anything is
/// written, so one malformed entry aborts the whole import and leaves the
/// current history untouched. Settings are applied as a sparse patch and may
/// restart the engine.
pub async fn import_session(
    store: &HistoryStore,
    settings: &SettingsController,
    payload: SessionImport,
) -> Result<(), SessionError> {
    if let Some(raw_logs) = payload.logs {
        let mut entries = Vec::with_capacity(raw_logs.len());
        for (index, raw) in raw_logs.into_iter().enumerate() {
            let entry =
                format::to_storage(raw).map_err(|source| SessionError::Entry { index, source })?;
            entries.push(entry);
        }
        let count = store.replace_all(entries).await?;
        info!("Imported {count} log entries");
    }

    if let Some(patch) = payload.settings {
        settings.update(patch).await?;
        info!("Applied imported session settings");
    }
    Ok(())
}
