//! File-backed capture history
//!
//! The history file is a pretty-printed JSON array of entries, rewritten
//! wholesale on every mutation. The store owns ID assignment: IDs start at 1
//! and stay monotonic for the life of the process, except when `clear` or a
//! session import explicitly resets the sequence.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::models::{LogEntry, NewEntry};

#[derive(Debug, Error)]
pub enum HistoryError {
    /// The history file exists but does not parse as an entry array.
    #[error("history file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("history file {path} could not be accessed")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("history entries could not be encoded")]
    Encode(#[source] serde_json::Error),
}

/// Durable store for completed exchanges.
///
/// All mutations run a load-mutate-rewrite cycle under one internal lock, so
/// writers within this process never clobber each other. The engine process
/// appends to the same file through its own hook; those writes remain
/// last-writer-wins, which is acceptable for a single-operator tool.
pub struct HistoryStore {
    path: PathBuf,
    /// Guarded value is the next ID to assign. Re-derived from the file
    /// during every mutation, reset by `clear` and `replace_all`.
    next_id: Mutex<u64>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            next_id: Mutex::new(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every stored entry. A missing file is an empty history; a file
    /// that exists but fails to parse is reported as corrupt.
    pub async fn load_all(&self) -> Result<Vec<LogEntry>, HistoryError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(HistoryError::Io {
                    path: self.path.clone(),
                    source: err,
                })
            }
        };
        serde_json::from_str(&raw).map_err(|err| HistoryError::Corrupt {
            path: self.path.clone(),
            source: err,
        })
    }

    /// Read every stored entry, degrading to an empty history when the file
    /// cannot be read. Used by the listing path, which must never fail.
    pub async fn load_or_empty(&self) -> Vec<LogEntry> {
        match self.load_all().await {
            Ok(entries) => entries,
            Err(err) => {
                error!("Failed to load history, treating as empty: {err}");
                Vec::new()
            }
        }
    }

    /// Append a completed exchange, assigning the next sequential ID.
    ///
    /// An unreadable history is treated as empty here so that capture keeps
    /// working even if the file was corrupted externally; the rewrite then
    /// replaces the corrupt content.
    pub async fn append(&self, new: NewEntry) -> Result<LogEntry, HistoryError> {
        let mut next_id = self.next_id.lock().await;
        let mut entries = match self.load_all().await {
            Ok(entries) => entries,
            Err(err) => {
                warn!("History unreadable before append, starting a fresh log: {err}");
                Vec::new()
            }
        };

        let assigned = (*next_id).max(highest_id(&entries) + 1);
        let entry = new.into_entry(assigned);
        entries.push(entry.clone());
        self.write_entries(&entries).await?;
        *next_id = assigned + 1;

        debug!(
            "Appended history entry {} ({} {})",
            assigned, entry.request.method, entry.request.url
        );
        Ok(entry)
    }

    /// Remove the entry with the given ID. Returns whether anything was
    /// removed; deleting an unknown ID is not an error.
    pub async fn delete_by_id(&self, id: u64) -> Result<bool, HistoryError> {
        let mut next_id = self.next_id.lock().await;
        let mut entries = self.load_all().await?;
        let loaded_max = highest_id(&entries);

        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;
        self.write_entries(&entries).await?;
        *next_id = (*next_id).max(loaded_max + 1);

        if removed {
            info!("Deleted history entry {id}");
        } else {
            debug!("Delete requested for unknown history entry {id}");
        }
        Ok(removed)
    }

    /// Apply a closure to the entry with the given ID and persist the result.
    /// Returns whether the entry was found.
    pub async fn update_by_id<F>(&self, id: u64, apply: F) -> Result<bool, HistoryError>
    where
        F: FnOnce(&mut LogEntry),
    {
        let mut next_id = self.next_id.lock().await;
        let mut entries = self.load_all().await?;
        let loaded_max = highest_id(&entries);

        let found = match entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => {
                apply(entry);
                true
            }
            None => false,
        };
        if found {
            self.write_entries(&entries).await?;
        }
        *next_id = (*next_id).max(loaded_max + 1);
        Ok(found)
    }

    /// Drop every entry and reset the ID sequence back to 1.
    pub async fn clear(&self) -> Result<(), HistoryError> {
        let mut next_id = self.next_id.lock().await;
        self.write_entries(&[]).await?;
        *next_id = 1;
        info!("History cleared");
        Ok(())
    }

    /// Replace the whole history with the given entries, keeping their IDs,
    /// and re-derive the ID sequence from them. The write is verified by
    /// reading the file back. Returns the number of entries persisted.
    pub async fn replace_all(&self, entries: Vec<LogEntry>) -> Result<usize, HistoryError> {
        let mut next_id = self.next_id.lock().await;
        self.write_entries(&entries).await?;
        let written = self.load_all().await?;
        *next_id = highest_id(&written) + 1;

        info!("History replaced with {} entries", written.len());
        Ok(written.len())
    }

    async fn write_entries(&self, entries: &[LogEntry]) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|err| HistoryError::Io {
                        path: parent.to_path_buf(),
                        source: err,
                    })?;
            }
        }
        let json = serde_json::to_string_pretty(entries).map_err(HistoryError::Encode)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|err| HistoryError::Io {
                path: self.path.clone(),
                source: err,
            })
    }
}

fn highest_id(entries: &[LogEntry]) -> u64 {
    entries.iter().map(|entry| entry.id).max().unwrap_or(0)
}
