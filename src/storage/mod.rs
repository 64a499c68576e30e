//! Persistence for captured traffic
//!
//! History lives in a single pretty-printed JSON array on disk, so a session
//! directory stays inspectable with nothing more than a text editor.

pub mod format;
pub mod history;
pub mod session;

pub use history::{HistoryError, HistoryStore};
pub use session::{export_session, import_session, SessionError, SessionExport, SessionImport};
