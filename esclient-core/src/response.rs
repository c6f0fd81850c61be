//! Response wrapper and outcome classification.

use crate::{Error, PartialShardFailureError, Request, ResponseError, Result};
use http::HeaderMap;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::net::SocketAddr;
use std::time::Duration;

/// Transport-layer metadata about one transfer.
#[derive(Debug, Clone, Default)]
pub struct TransferInfo {
    /// Effective URL.
    pub url: String,
    /// HTTP method sent.
    pub method: String,
    /// HTTP status code.
    pub http_code: u16,
    /// Headers sent with the request.
    pub request_headers: HeaderMap,
    /// Headers received.
    pub response_headers: HeaderMap,
    /// Total transfer time.
    pub total_time: Duration,
    /// Remote address, when known.
    pub primary_ip: Option<SocketAddr>,
    /// Number of body bytes received.
    pub size_download: usize,
}

/// Shard statistics from `_shards`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ShardStats {
    /// Shards targeted.
    #[serde(default)]
    pub total: u64,
    /// Shards that answered.
    #[serde(default)]
    pub successful: u64,
    /// Shards skipped.
    #[serde(default)]
    pub skipped: u64,
    /// Shards that failed.
    #[serde(default)]
    pub failed: u64,
}

/// A response from the engine.
#[derive(Debug, Clone)]
pub struct Response {
    raw: String,
    data: Value,
    status: u16,
    query_time: Duration,
    transfer_info: Option<TransferInfo>,
}

impl Response {
    /// Create a response from a raw body and status code.
    ///
    /// Bodies that are not JSON are kept under a `message` key.
    pub fn new(raw: impl Into<String>, status: u16) -> Self {
        let raw = raw.into();
        let data = if raw.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_str(&raw).unwrap_or_else(|_| json!({ "message": raw }))
        };

        Self {
            raw,
            data,
            status,
            query_time: Duration::ZERO,
            transfer_info: None,
        }
    }

    /// Create a response from already decoded data.
    pub fn from_data(data: Value, status: u16) -> Self {
        Self {
            raw: data.to_string(),
            data,
            status,
            query_time: Duration::ZERO,
            transfer_info: None,
        }
    }

    /// Record the measured query time.
    pub fn with_query_time(mut self, query_time: Duration) -> Self {
        self.query_time = query_time;
        self
    }

    /// Record transfer metadata.
    pub fn with_transfer_info(mut self, info: TransferInfo) -> Self {
        self.transfer_info = Some(info);
        self
    }

    /// Get the raw body.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Get the decoded body.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Consume the response and return the decoded body.
    pub fn into_data(self) -> Value {
        self.data
    }

    /// Deserialize the decoded body.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }

    /// Get the HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Get the time spent on the transfer.
    pub fn query_time(&self) -> Duration {
        self.query_time
    }

    /// Get the transport-layer metadata.
    pub fn transfer_info(&self) -> Option<&TransferInfo> {
        self.transfer_info.as_ref()
    }

    // =========================================================================
    // Classification
    // =========================================================================

    /// Get the `error` field when present and non-empty.
    pub fn error(&self) -> Option<&Value> {
        match self.data.get("error")? {
            Value::Null => None,
            Value::Bool(false) => None,
            Value::String(s) if s.is_empty() => None,
            Value::Object(map) if map.is_empty() => None,
            Value::Array(items) if items.is_empty() => None,
            error => Some(error),
        }
    }

    /// Check if the engine reported an error.
    ///
    /// A non-empty `error` field or a 5xx status counts; a 4xx without an
    /// `error` field (a missing document, a failed HEAD check) does not.
    pub fn has_error(&self) -> bool {
        self.error().is_some() || self.status >= 500
    }

    /// Check if any shard failed.
    pub fn has_failed_shards(&self) -> bool {
        self.shards_statistics().is_some_and(|shards| shards.failed > 0)
    }

    /// Neither an error nor failed shards.
    pub fn is_ok(&self) -> bool {
        !self.has_error() && !self.has_failed_shards()
    }

    /// Human-readable error message, empty when there is none.
    pub fn error_message(&self) -> String {
        match self.error() {
            Some(Value::String(message)) => message.clone(),
            Some(error @ Value::Object(_)) => error["root_cause"]
                .get(0)
                .and_then(|cause| cause["reason"].as_str())
                .or(error["reason"].as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string()),
            Some(other) => other.to_string(),
            None if self.status >= 500 => self.data["message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP status {}", self.status)),
            None => String::new(),
        }
    }

    /// Engine-side execution time in milliseconds (`took`).
    pub fn engine_time(&self) -> Option<u64> {
        self.data.get("took").and_then(Value::as_u64)
    }

    /// Shard statistics (`_shards`).
    pub fn shards_statistics(&self) -> Option<ShardStats> {
        self.data
            .get("_shards")
            .and_then(|shards| ShardStats::deserialize(shards).ok())
    }

    /// Scroll id, for scroll searches.
    pub fn scroll_id(&self) -> Option<&str> {
        self.data.get("_scroll_id").and_then(Value::as_str)
    }
}

/// Turn a response into a typed outcome.
///
/// Errors win over partial shard failures.
pub fn classify(request: &Request, response: Response) -> Result<Response> {
    if response.has_error() {
        return Err(Error::Response(ResponseError::new(request.clone(), response)));
    }
    if response.has_failed_shards() {
        return Err(Error::PartialShardFailure(PartialShardFailureError::new(
            request.clone(),
            response,
        )));
    }
    Ok(response)
}
