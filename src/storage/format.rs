use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::models::{
    DisplayEntry, HeaderMap, LogEntry, RequestRecord, ResponseRecord, StatusValue,
};

/// A raw history entry that could not be converted into the storage shape.
#[derive(Debug, Error)]
pub enum MalformedEntry {
    #[error("history entry is not a JSON object: {0}")]
    Invalid(serde_json::Error),
    #[error("history entry is missing required field `{0}`")]
    MissingField(&'static str),
}

#[derive(Deserialize)]
struct RawEntry {
    id: Option<u64>,
    timestamp: Option<String>,
    #[serde(default)]
    content_length: Option<u64>,
    // Nested shape, as written by the capture sink and session exports.
    request: Option<RawRequest>,
    response: Option<RawResponse>,
    // Flat shape, as written by older clients.
    method: Option<String>,
    url: Option<String>,
    status: Option<StatusValue>,
    request_headers: Option<HeaderMap>,
    #[serde(default)]
    request_content: Option<String>,
    response_headers: Option<HeaderMap>,
    #[serde(default)]
    response_content: Option<String>,
}

#[derive(Deserialize)]
struct RawRequest {
    method: Option<String>,
    url: Option<String>,
    headers: Option<HeaderMap>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct RawResponse {
    status_code: Option<StatusValue>,
    headers: Option<HeaderMap>,
    #[serde(default)]
    content: Option<String>,
}

/// Lift a stored entry into the shape served to clients: the flattened
/// method, URL, and status fields plus the nested records unchanged.
pub fn to_display(entry: &LogEntry) -> DisplayEntry {
    DisplayEntry {
        id: entry.id,
        timestamp: entry.timestamp.clone(),
        method: entry.request.method.clone(),
        url: entry.request.url.clone(),
        status: entry.response.status_code,
        content_length: entry.content_length,
        request: entry.request.clone(),
        response: entry.response.clone(),
    }
}

/// Convert a raw client-supplied entry into the storage shape.
///
/// Accepts both the nested shape produced by [`to_display`] and the flat
/// shape written by older clients. The rebuilt request timestamp always
/// mirrors the entry timestamp. Converting a displayed entry back yields the
/// original stored entry, so import/export round trips are lossless.
pub fn to_storage(value: Value) -> Result<LogEntry, MalformedEntry> {
    let raw: RawEntry = serde_json::from_value(value).map_err(MalformedEntry::Invalid)?;

    let id = raw.id.ok_or(MalformedEntry::MissingField("id"))?;
    let timestamp = raw
        .timestamp
        .ok_or(MalformedEntry::MissingField("timestamp"))?;

    let (request, response) = match (raw.request, raw.response) {
        (Some(request), Some(response)) => {
            let request = RequestRecord {
                method: request
                    .method
                    .ok_or(MalformedEntry::MissingField("request.method"))?,
                url: request
                    .url
                    .ok_or(MalformedEntry::MissingField("request.url"))?,
                headers: request
                    .headers
                    .ok_or(MalformedEntry::MissingField("request.headers"))?,
                content: request.content,
                timestamp: timestamp.clone(),
            };
            let response = ResponseRecord {
                status_code: response
                    .status_code
                    .ok_or(MalformedEntry::MissingField("response.status_code"))?,
                headers: response.headers.unwrap_or_default(),
                content: response.content,
            };
            (request, response)
        }
        _ => {
            let request = RequestRecord {
                method: raw.method.ok_or(MalformedEntry::MissingField("method"))?,
                url: raw.url.ok_or(MalformedEntry::MissingField("url"))?,
                headers: raw
                    .request_headers
                    .ok_or(MalformedEntry::MissingField("request_headers"))?,
                content: raw.request_content,
                timestamp: timestamp.clone(),
            };
            let response = ResponseRecord {
                status_code: raw.status.ok_or(MalformedEntry::MissingField("status"))?,
                headers: raw.response_headers.unwrap_or_default(),
                content: raw.response_content,
            };
            (request, response)
        }
    };

    Ok(LogEntry {
        id,
        timestamp,
        content_length: raw.content_length,
        request,
        response,
    })
}
