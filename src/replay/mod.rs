//! Manual request replay
//!
//! The repeater sends one hand-edited HTTP request and records the attempt
//! in capture history next to proxied traffic. The entry is appended with a
//! pending status before the request leaves, then updated with the final
//! status, or with an error marker when the send fails.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::redirect;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::models::{HeaderMap, NewEntry, RequestRecord, ResponseRecord, StatusValue};
use crate::storage::{HistoryError, HistoryStore};

const SEND_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: usize = 10;

/// Headers never forwarded verbatim; the client recomputes these itself.
const DROPPED_HEADERS: [&str; 3] = ["host", "content-length", "transfer-encoding"];

/// A request as edited in the repeater pane. `headers` carries the raw
/// header block, whose first line is the request line.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendParams {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub headers: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub follow_redirects: bool,
}

/// What came back from the target server.
#[derive(Debug, Serialize)]
pub struct SendOutcome {
    pub status: u16,
    #[serde(rename = "statusText")]
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("request URL is required")]
    MissingUrl,
    #[error("invalid HTTP method: {0:?}")]
    Method(String),
    #[error("request failed: {0}")]
    Send(#[from] reqwest::Error),
    #[error(transparent)]
    History(#[from] HistoryError),
}

pub struct Repeater {
    store: Arc<HistoryStore>,
}

impl Repeater {
    pub fn new(store: Arc<HistoryStore>) -> Self {
        Self { store }
    }

    /// Send one request. The attempt is appended to history before the
    /// request leaves, so a failed send still stays visible in the log.
    pub async fn send(&self, params: SendParams) -> Result<SendOutcome, ReplayError> {
        if params.url.trim().is_empty() {
            return Err(ReplayError::MissingUrl);
        }
        let method = reqwest::Method::from_bytes(params.method.trim().to_uppercase().as_bytes())
            .map_err(|_| ReplayError::Method(params.method.clone()))?;

        let headers = parse_header_block(&params.headers);
        let entry = self
            .store
            .append(pending_entry(&method, &params, &headers))
            .await?;
        let id = entry.id;

        match execute(method, &params, &headers).await {
            Ok(outcome) => {
                let updated = self
                    .store
                    .update_by_id(id, |entry| {
                        entry.response.status_code = StatusValue::Code(outcome.status);
                        entry.response.headers = outcome.headers.clone();
                        entry.response.content = Some(outcome.body.clone());
                        entry.content_length = Some(outcome.body.len() as u64);
                    })
                    .await;
                if let Err(err) = updated {
                    warn!("Could not record replay response for entry {id}: {err}");
                }
                Ok(outcome)
            }
            Err(err) => {
                let text = err.to_string();
                let updated = self
                    .store
                    .update_by_id(id, |entry| {
                        entry.response.status_code = StatusValue::error();
                        entry.response.content = Some(text.clone());
                    })
                    .await;
                if let Err(store_err) = updated {
                    warn!("Could not record replay failure for entry {id}: {store_err}");
                }
                Err(ReplayError::Send(err))
            }
        }
    }
}

/// Parse the raw header block. The first line is the request line and is
/// skipped; the rest split once on ':'. Lines that do not look like a
/// header are dropped with a warning.
fn parse_header_block(block: &str) -> Vec<(String, String)> {
    let mut headers = Vec::new();
    for line in block.lines().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
            _ => warn!("Skipping malformed header line in replay request: {line}"),
        }
    }
    headers
}

fn pending_entry(
    method: &reqwest::Method,
    params: &SendParams,
    headers: &[(String, String)],
) -> NewEntry {
    let request = RequestRecord {
        method: method.to_string(),
        url: params.url.clone(),
        headers: header_map(headers),
        content: (!params.body.is_empty()).then(|| params.body.clone()),
        timestamp: Utc::now().to_rfc3339(),
    };
    let response = ResponseRecord {
        status_code: StatusValue::pending(),
        headers: HeaderMap::new(),
        content: None,
    };
    NewEntry::new(request, response, None)
}

fn header_map(pairs: &[(String, String)]) -> HeaderMap {
    pairs
        .iter()
        .map(|(name, value)| (name.clone(), Value::String(value.clone())))
        .collect()
}

async fn execute(
    method: reqwest::Method,
    params: &SendParams,
    headers: &[(String, String)],
) -> Result<SendOutcome, reqwest::Error> {
    let redirects = if params.follow_redirects {
        redirect::Policy::limited(MAX_REDIRECTS)
    } else {
        redirect::Policy::none()
    };
    // Replayed requests often target hosts behind the intercepting proxy or
    // with self-signed certificates, so certificate verification stays off.
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(SEND_TIMEOUT)
        .redirect(redirects)
        .build()?;

    let mut request = client.request(method, &params.url);
    for (name, value) in headers {
        if DROPPED_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::from_str(value),
        ) {
            (Ok(parsed_name), Ok(parsed_value)) => {
                request = request.header(parsed_name, parsed_value);
            }
            _ => warn!("Skipping unusable header in replay request: {name}"),
        }
    }
    if !params.body.is_empty() {
        request = request.body(params.body.clone());
    }

    let response = request.send().await?;
    let status = response.status();
    let status_text = status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.as_u16().to_string());
    let mut response_headers = HeaderMap::new();
    for (name, value) in response.headers() {
        response_headers.insert(
            name.to_string(),
            Value::String(value.to_str().unwrap_or("").to_string()),
        );
    }
    let body = response.text().await?;

    Ok(SendOutcome {
        status: status.as_u16(),
        status_text,
        headers: response_headers,
        body,
    })
}
