//! Error taxonomy for the request lifecycle.
//!
//! Callers must be able to tell three outcomes apart:
//!
//! - nothing answered ([`ConnectionError`]),
//! - something answered with an error ([`ResponseError`]),
//! - something answered but some shards failed ([`PartialShardFailureError`]).
//!
//! Selection and configuration mistakes ([`Error::NoEnabledConnection`],
//! [`Error::Invalid`], [`Error::Client`]) are never retried.

use crate::{Request, Response};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Client errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The transfer could not be completed against a connection.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The engine answered with an `error` payload.
    #[error(transparent)]
    Response(#[from] ResponseError),

    /// The engine answered, but some shards failed.
    #[error(transparent)]
    PartialShardFailure(#[from] PartialShardFailureError),

    /// Every connection in the pool is disabled.
    #[error("No enabled connection found")]
    NoEnabledConnection,

    /// Generic client-side failure.
    #[error("Client error: {0}")]
    Client(String),

    /// Invalid strategy, transport or transfer option.
    #[error("Invalid argument: {0}")]
    Invalid(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Check if this is a transfer-level failure on a specific connection.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Check if this is a programmer error (bad strategy or transport, empty pool).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NoEnabledConnection | Self::Client(_) | Self::Invalid(_)
        )
    }

    /// Check if this is a partial shard failure.
    pub fn is_partial_shard_failure(&self) -> bool {
        matches!(self, Self::PartialShardFailure(_))
    }

    /// Get the response attached to this error, if any.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Connection(e) => e.response(),
            Self::Response(e) => Some(e.response()),
            Self::PartialShardFailure(e) => Some(e.response()),
            _ => None,
        }
    }

    /// Get the HTTP status code if a response was received.
    pub fn status_code(&self) -> Option<u16> {
        self.response().map(Response::status)
    }
}

// ============================================================================
// Connection errors
// ============================================================================

/// Kind of transfer failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferErrorKind {
    /// Host could not be resolved or the connection was refused.
    Connect,
    /// The transfer timed out.
    Timeout,
    /// Too many redirects.
    Redirect,
    /// Reading or writing the body failed.
    Body,
    /// Response body could not be decoded.
    Decode,
    /// The request could not be built or sent.
    Request,
    /// Transfer layer reported an error status.
    Status,
    /// Anything else.
    Other,
}

impl TransferErrorKind {
    /// Classify a `reqwest` error.
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() {
            Self::Connect
        } else if error.is_redirect() {
            Self::Redirect
        } else if error.is_body() {
            Self::Body
        } else if error.is_decode() {
            Self::Decode
        } else if error.is_status() {
            Self::Status
        } else if error.is_request() || error.is_builder() {
            Self::Request
        } else {
            Self::Other
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::Connect => "couldn't connect to host",
            Self::Timeout => "operation timed out",
            Self::Redirect => "too many redirects",
            Self::Body => "failure transferring the body",
            Self::Decode => "failure decoding the response",
            Self::Request => "failure sending the request",
            Self::Status => "transfer returned an error status",
            Self::Other => "unknown transfer error",
        }
    }
}

impl fmt::Display for TransferErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// The transfer against a connection could not be completed.
#[derive(Debug, Error)]
#[error("Connection error ({kind}): {message}")]
pub struct ConnectionError {
    kind: TransferErrorKind,
    message: String,
    request: Box<Request>,
    response: Option<Box<Response>>,
    #[source]
    source: Option<reqwest::Error>,
}

impl ConnectionError {
    /// Create a connection error without an underlying transfer error.
    pub fn new(kind: TransferErrorKind, message: impl Into<String>, request: Request) -> Self {
        Self {
            kind,
            message: message.into(),
            request: Box::new(request),
            response: None,
            source: None,
        }
    }

    /// Wrap a `reqwest` transfer error.
    pub fn from_reqwest(error: reqwest::Error, request: Request) -> Self {
        Self {
            kind: TransferErrorKind::from_reqwest(&error),
            message: error.to_string(),
            request: Box::new(request),
            response: None,
            source: Some(error),
        }
    }

    /// Attach the partial response received before the failure.
    pub fn with_response(mut self, response: Response) -> Self {
        self.response = Some(Box::new(response));
        self
    }

    /// Get the failure kind.
    pub fn kind(&self) -> TransferErrorKind {
        self.kind
    }

    /// Get the failure message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the request that failed.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Get the partial response, if any.
    pub fn response(&self) -> Option<&Response> {
        self.response.as_deref()
    }

    /// Check if the failure was a timeout.
    pub fn is_timeout(&self) -> bool {
        self.kind == TransferErrorKind::Timeout
    }
}

// ============================================================================
// Response errors
// ============================================================================

/// The engine returned a well-formed response carrying an `error`.
#[derive(Debug, Error)]
#[error("Response error ({}): {}", .response.status(), .response.error_message())]
pub struct ResponseError {
    request: Box<Request>,
    response: Box<Response>,
}

impl ResponseError {
    /// Create a new response error.
    pub fn new(request: Request, response: Response) -> Self {
        Self {
            request: Box::new(request),
            response: Box::new(response),
        }
    }

    /// Get the request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Get the response.
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Parse the server-side error carried by the response.
    pub fn elasticsearch_error(&self) -> ElasticsearchError {
        ElasticsearchError::from_response(&self.response)
    }
}

/// The engine answered, but at least one shard failed.
#[derive(Debug, Error)]
#[error("{} of {} shards failed: {}", failed_shards(.response), total_shards(.response), shard_failure_reason(.response))]
pub struct PartialShardFailureError {
    request: Box<Request>,
    response: Box<Response>,
}

impl PartialShardFailureError {
    /// Create a new partial shard failure error.
    pub fn new(request: Request, response: Response) -> Self {
        Self {
            request: Box::new(request),
            response: Box::new(response),
        }
    }

    /// Get the request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Get the response. Its hits are still usable.
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Consume the error and keep the degraded response.
    pub fn into_response(self) -> Response {
        *self.response
    }
}

fn failed_shards(response: &Response) -> u64 {
    response.shards_statistics().map_or(0, |s| s.failed)
}

fn total_shards(response: &Response) -> u64 {
    response.shards_statistics().map_or(0, |s| s.total)
}

fn shard_failure_reason(response: &Response) -> String {
    response.data()["_shards"]["failures"]
        .as_array()
        .and_then(|failures| failures.first())
        .and_then(|failure| failure["reason"]["reason"].as_str().or(failure["reason"].as_str()))
        .unwrap_or("unknown reason")
        .to_string()
}

// ============================================================================
// Server-side error
// ============================================================================

const REMOTE_TRANSPORT_EXCEPTION: &str = "RemoteTransportException";
const REMOTE_TRANSPORT_TYPE: &str = "remote_transport_exception";

/// Error reported by the engine, parsed from a response `error` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElasticsearchError {
    name: String,
    message: String,
    status: u16,
    remote: bool,
}

impl ElasticsearchError {
    /// Parse the error carried by a response.
    pub fn from_response(response: &Response) -> Self {
        let status = response.status();
        match response.data().get("error") {
            Some(Value::String(error)) => Self::parse_legacy(error, status),
            Some(error @ Value::Object(_)) => Self::parse_structured(error, status),
            _ => Self {
                name: String::new(),
                message: response.error_message(),
                status,
                remote: false,
            },
        }
    }

    /// Parse `Name[details]; nested: Other[details]` strings.
    fn parse_legacy(error: &str, status: u16) -> Self {
        let parts: Vec<&str> = error.split("]; nested: ").collect();
        let first = exception_name(parts[0]);

        let (name, remote) = if parts.len() > 1 && first == REMOTE_TRANSPORT_EXCEPTION {
            (exception_name(parts[1]), true)
        } else {
            (first, false)
        };

        Self {
            name: name.to_string(),
            message: error.to_string(),
            status,
            remote,
        }
    }

    /// Parse `{"type": ..., "reason": ..., "caused_by": {...}}` objects.
    fn parse_structured(error: &Value, status: u16) -> Self {
        let mut cause = error;
        let mut remote = false;
        if cause["type"].as_str() == Some(REMOTE_TRANSPORT_TYPE) && cause["caused_by"].is_object() {
            remote = true;
            cause = &cause["caused_by"];
        }

        Self {
            name: cause["type"].as_str().unwrap_or_default().to_string(),
            message: cause["reason"]
                .as_str()
                .or(error["reason"].as_str())
                .unwrap_or_default()
                .to_string(),
            status,
            remote,
        }
    }

    /// Exception name, e.g. `IndexMissingException` or `index_not_found_exception`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status code the error was returned with.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Whether the error originated on a different node than the one that answered.
    pub fn is_remote(&self) -> bool {
        self.remote
    }
}

impl fmt::Display for ElasticsearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name, self.status, self.message)
    }
}

fn exception_name(error: &str) -> &str {
    error.split('[').next().unwrap_or(error).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response_with(error: Value, status: u16) -> Response {
        Response::new(json!({ "error": error, "status": status }).to_string(), status)
    }

    #[test]
    fn test_parse_legacy_error() {
        let response = response_with(
            json!("IndexMissingException[[logs] missing]"),
            404,
        );
        let error = ElasticsearchError::from_response(&response);

        assert_eq!(error.name(), "IndexMissingException");
        assert_eq!(error.status(), 404);
        assert!(!error.is_remote());
    }

    #[test]
    fn test_parse_legacy_remote_error() {
        let response = response_with(
            json!("RemoteTransportException[[node-2][inet[/10.0.0.2:9300]][search]]; nested: SearchParseException[[logs][0]: query parse failure]; "),
            400,
        );
        let error = ElasticsearchError::from_response(&response);

        assert_eq!(error.name(), "SearchParseException");
        assert!(error.is_remote());
    }

    #[test]
    fn test_parse_structured_remote_error() {
        let response = response_with(
            json!({
                "type": "remote_transport_exception",
                "reason": "[node-2][10.0.0.2:9300][indices:data/write/index]",
                "caused_by": {
                    "type": "version_conflict_engine_exception",
                    "reason": "[1]: version conflict"
                }
            }),
            409,
        );
        let error = ElasticsearchError::from_response(&response);

        assert_eq!(error.name(), "version_conflict_engine_exception");
        assert_eq!(error.message(), "[1]: version conflict");
        assert!(error.is_remote());
    }

    #[test]
    fn test_error_classification_helpers() {
        assert!(Error::NoEnabledConnection.is_client_error());
        assert!(Error::Invalid("bad".into()).is_client_error());

        let request = Request::get("_search");
        let err: Error =
            ConnectionError::new(TransferErrorKind::Timeout, "timed out", request).into();
        assert!(err.is_connection());
        assert!(!err.is_client_error());
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_partial_failure_display() {
        let response = Response::new(
            json!({
                "_shards": {
                    "total": 5,
                    "successful": 4,
                    "failed": 1,
                    "failures": [{ "shard": 2, "reason": { "type": "x", "reason": "shard offline" } }]
                }
            })
            .to_string(),
            200,
        );
        let err = PartialShardFailureError::new(Request::get("_search"), response);

        assert_eq!(err.to_string(), "1 of 5 shards failed: shard offline");
    }
}
