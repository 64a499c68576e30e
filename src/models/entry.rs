//! Capture history entry model
//!
//! Represents a single request/response exchange recorded by the proxy
//! engine, in the shape it is persisted to the history file.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Header map preserving wire order. Values are kept as raw JSON so that
/// imported sessions survive a round trip without coercion.
pub type HeaderMap = serde_json::Map<String, Value>;

/// Build an ordered header map from name/value pairs.
pub fn headers_from_pairs<'a, I>(pairs: I) -> HeaderMap
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
        .collect()
}

/// Response status as recorded in history: a numeric code for completed
/// exchanges, or a marker while a replayed request is in flight or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusValue {
    Code(u16),
    Marker(StatusMarker),
}

/// Placeholder states used by replayed requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusMarker {
    Pending,
    Error,
}

impl StatusValue {
    pub fn pending() -> Self {
        StatusValue::Marker(StatusMarker::Pending)
    }

    pub fn error() -> Self {
        StatusValue::Marker(StatusMarker::Error)
    }

    /// Numeric code, if the exchange completed.
    pub fn code(&self) -> Option<u16> {
        match self {
            StatusValue::Code(code) => Some(*code),
            StatusValue::Marker(_) => None,
        }
    }
}

impl From<u16> for StatusValue {
    fn from(code: u16) -> Self {
        StatusValue::Code(code)
    }
}

impl std::fmt::Display for StatusValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusValue::Code(code) => write!(f, "{code}"),
            StatusValue::Marker(StatusMarker::Pending) => write!(f, "pending"),
            StatusValue::Marker(StatusMarker::Error) => write!(f, "error"),
        }
    }
}

/// Request half of a recorded exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// HTTP method as seen on the wire
    pub method: String,
    /// Full request URL
    pub url: String,
    /// Request headers in wire order
    pub headers: HeaderMap,
    /// Decoded request body, if any
    #[serde(default)]
    pub content: Option<String>,
    /// When the request was observed (ISO-8601)
    pub timestamp: String,
}

/// Response half of a recorded exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    /// Status code, or a pending/error marker for replayed requests
    pub status_code: StatusValue,
    /// Response headers in wire order
    pub headers: HeaderMap,
    /// Decoded response body, if any
    #[serde(default)]
    pub content: Option<String>,
}

/// One persisted history entry.
///
/// The top-level timestamp always mirrors `request.timestamp`; both record
/// the moment the request was first observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Sequential identifier assigned by the history store, starting at 1
    pub id: u64,
    /// When the request was observed (ISO-8601)
    pub timestamp: String,
    /// Decoded response body length in bytes, if known
    #[serde(default)]
    pub content_length: Option<u64>,
    pub request: RequestRecord,
    pub response: ResponseRecord,
}

/// A completed exchange ready for persistence, before the store assigns an ID.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub timestamp: String,
    pub content_length: Option<u64>,
    pub request: RequestRecord,
    pub response: ResponseRecord,
}

impl NewEntry {
    /// Create a new entry. The entry timestamp is taken from the request
    /// record so the two always agree.
    pub fn new(
        request: RequestRecord,
        response: ResponseRecord,
        content_length: Option<u64>,
    ) -> Self {
        Self {
            timestamp: request.timestamp.clone(),
            content_length,
            request,
            response,
        }
    }

    pub fn into_entry(self, id: u64) -> LogEntry {
        LogEntry {
            id,
            timestamp: self.timestamp,
            content_length: self.content_length,
            request: self.request,
            response: self.response,
        }
    }
}

/// A history entry as served to clients: the stored entry plus flattened
/// method, URL, and status fields for list rendering. The nested records are
/// kept alongside the flattened fields for compatibility with older clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayEntry {
    pub id: u64,
    pub timestamp: String,
    pub method: String,
    pub url: String,
    pub status: StatusValue,
    #[serde(default)]
    pub content_length: Option<u64>,
    pub request: RequestRecord,
    pub response: ResponseRecord,
}
