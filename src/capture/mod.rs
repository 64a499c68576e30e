//! Flow capture
//!
//! The callback surface the engine invokes per observed exchange. Capture is
//! two-phase: the request half is snapshotted when first observed, and the
//! completed entry is persisted only once the response arrives. A request
//! without a response is never written to history.

use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{HeaderMap, LogEntry, NewEntry, RequestRecord, ResponseRecord, StatusValue};
use crate::storage::HistoryStore;

/// One exchange as reported by the engine.
#[derive(Debug, Clone)]
pub struct Flow {
    pub request: FlowRequest,
    pub response: Option<FlowResponse>,
    /// Request half captured when the request was first observed.
    snapshot: Option<RequestRecord>,
}

impl Flow {
    pub fn new(request: FlowRequest) -> Self {
        Self {
            request,
            response: None,
            snapshot: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlowRequest {
    pub method: String,
    pub url: String,
    /// Header pairs in wire order
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct FlowResponse {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

/// Writes observed exchanges through the history store.
pub struct CaptureSink {
    store: Arc<HistoryStore>,
}

impl CaptureSink {
    pub fn new(store: Arc<HistoryStore>) -> Self {
        Self { store }
    }

    /// Request observed: snapshot the request half onto the flow so the
    /// eventual entry reflects what was actually sent, stamped with the time
    /// the request was first seen.
    pub fn on_request(&self, flow: &mut Flow) {
        let snapshot = snapshot_request(&flow.request, Utc::now().to_rfc3339());
        debug!("Captured request {} {}", snapshot.method, snapshot.url);
        flow.snapshot = Some(snapshot);
    }

    /// Response observed: pair it with the request snapshot and append the
    /// completed entry to history.
    pub async fn on_response(&self, flow: &mut Flow) -> anyhow::Result<LogEntry> {
        let response = flow
            .response
            .as_ref()
            .ok_or_else(|| anyhow!("response callback invoked on a flow without a response"))?;

        let request = match flow.snapshot.take() {
            Some(snapshot) => snapshot,
            None => {
                // Exchange-local state can vanish across an engine restart.
                warn!(
                    "No request snapshot for {} {}, reconstructing with a fallback timestamp",
                    flow.request.method, flow.request.url
                );
                snapshot_request(&flow.request, Utc::now().to_rfc3339())
            }
        };

        let content = decode_body(response.body.as_deref());
        let content_length = match &content {
            Some(text) => Some(text.len() as u64),
            None => declared_content_length(&response.headers),
        };
        let record = ResponseRecord {
            status_code: StatusValue::Code(response.status_code),
            headers: header_map(&response.headers),
            content,
        };

        let entry = self
            .store
            .append(NewEntry::new(request, record, content_length))
            .await?;
        debug!(
            "Recorded exchange {} ({} {} -> {})",
            entry.id, entry.request.method, entry.request.url, entry.response.status_code
        );
        Ok(entry)
    }
}

fn snapshot_request(request: &FlowRequest, timestamp: String) -> RequestRecord {
    RequestRecord {
        method: request.method.clone(),
        url: request.url.clone(),
        headers: header_map(&request.headers),
        content: decode_body(request.body.as_deref()),
        timestamp,
    }
}

/// Best-effort text view of a body; invalid UTF-8 is replaced, never dropped.
fn decode_body(body: Option<&[u8]>) -> Option<String> {
    body.map(|bytes| String::from_utf8_lossy(bytes).into_owned())
}

/// The declared Content-Length, used only when no body bytes were captured.
/// Unparseable values are discarded.
fn declared_content_length(headers: &[(String, String)]) -> Option<u64> {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
}

fn header_map(pairs: &[(String, String)]) -> HeaderMap {
    pairs
        .iter()
        .map(|(name, value)| (name.clone(), Value::String(value.clone())))
        .collect()
}
