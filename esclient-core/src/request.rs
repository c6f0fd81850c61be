//! Requests sent through a transport.

use crate::{Connection, Result};
use http::Method;
use serde_json::Value;
use std::borrow::Cow;
use url::form_urlencoded;

/// Content type for JSON bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";
/// Content type for newline-delimited JSON bodies.
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    /// No body.
    #[default]
    Empty,
    /// Structured body, serialized to JSON.
    Json(Value),
    /// Pre-serialized body, sent as-is.
    Raw(String),
    /// One JSON document per line (bulk, multi-search).
    NdJson(Vec<Value>),
}

impl Body {
    /// Check if there is nothing to send.
    ///
    /// The raw string `"0"` is a body.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Json(Value::Null) => true,
            Self::Json(Value::Object(map)) => map.is_empty(),
            Self::Json(Value::Array(items)) => items.is_empty(),
            Self::Json(Value::String(s)) => s.is_empty(),
            Self::Json(_) => false,
            Self::Raw(raw) => raw.is_empty(),
            Self::NdJson(lines) => lines.is_empty(),
        }
    }

    /// Serialize the body for the wire, or `None` when empty.
    ///
    /// Escaped forward slashes (`\/`) in a pre-serialized body are
    /// unescaped: they corrupt embedded base64 payloads. Structured bodies are
    /// written by serde_json, which never escapes `/`, and go out verbatim.
    pub fn encode(&self) -> Result<Option<String>> {
        if self.is_empty() {
            return Ok(None);
        }

        let content = match self {
            Self::Empty => return Ok(None),
            Self::Json(value) => serde_json::to_string(value)?,
            Self::Raw(raw) => raw.replace("\\/", "/"),
            Self::NdJson(lines) => {
                let mut content = String::new();
                for line in lines {
                    content.push_str(&serde_json::to_string(line)?);
                    content.push('\n');
                }
                content
            }
        };

        Ok(Some(content))
    }

    /// Default content type for this body.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::NdJson(_) => NDJSON_CONTENT_TYPE,
            _ => JSON_CONTENT_TYPE,
        }
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for Body {
    fn from(raw: String) -> Self {
        Self::Raw(raw)
    }
}

impl From<&str> for Body {
    fn from(raw: &str) -> Self {
        Self::Raw(raw.to_string())
    }
}

impl From<Option<Value>> for Body {
    fn from(value: Option<Value>) -> Self {
        value.map_or(Self::Empty, Self::Json)
    }
}

/// A request against the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Body,
    content_type: Option<String>,
}

impl Request {
    /// Create a request.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: Body::Empty,
            content_type: None,
        }
    }

    /// Create a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Create a POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Create a PUT request.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// Create a DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Create a HEAD request.
    pub fn head(path: impl Into<String>) -> Self {
        Self::new(Method::HEAD, path)
    }

    /// Create a request scoped to index/type segments, e.g.
    /// `["logs", "", "_search"]` → `logs/_search`. Empty segments are skipped.
    pub fn scoped(method: Method, segments: &[&str]) -> Self {
        let path = segments
            .iter()
            .map(|segment| segment.trim_matches('/'))
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Self::new(method, path)
    }

    /// Add a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Add multiple query parameters.
    pub fn with_queries<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        for (k, v) in params {
            self.query.push((k.into(), v.to_string()));
        }
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a structured JSON body.
    pub fn with_json(self, value: Value) -> Self {
        self.with_body(Body::Json(value))
    }

    /// Set a newline-delimited JSON body.
    pub fn with_ndjson(self, lines: Vec<Value>) -> Self {
        self.with_body(Body::NdJson(lines))
    }

    /// Override the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Get the method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Set the method.
    pub fn set_method(&mut self, method: Method) -> &mut Self {
        self.method = method;
        self
    }

    /// Get the path, relative to the connection's base URI.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get the query parameters.
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Check if a query parameter is set.
    pub fn has_query(&self, key: &str) -> bool {
        self.query.iter().any(|(k, _)| k == key)
    }

    /// Get the body.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Check if a body will be sent.
    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    /// Get the content type.
    pub fn content_type(&self) -> &str {
        self.content_type
            .as_deref()
            .unwrap_or_else(|| self.body.content_type())
    }

    /// Encoded query string, without the leading `?`.
    pub fn query_string(&self) -> Option<String> {
        if self.query.is_empty() {
            return None;
        }
        serde_urlencoded::to_string(&self.query).ok()
    }

    /// Render the request as a `curl` command against `connection`.
    pub fn to_curl_command(&self, connection: &Connection) -> String {
        let mut command = format!("curl -X{} '", self.method.as_str());
        command.push_str(&connection.base_url("http"));
        command.push_str(escape_date_math(self.path.trim_start_matches('/')).as_ref());
        if let Some(query) = self.query_string() {
            command.push('?');
            command.push_str(&query);
        }
        command.push('\'');

        if let Ok(Some(body)) = self.body.encode() {
            command.push_str(" -d '");
            command.push_str(&body.replace('\'', "'\\''"));
            command.push('\'');
        }
        command
    }
}

/// Percent-encode date-math index names such as `<logs-{now/d}>`.
///
/// Paths that are already encoded are returned unchanged.
pub fn escape_date_math(path: &str) -> Cow<'_, str> {
    if !path.contains('<') || path.contains("%3C") {
        return Cow::Borrowed(path);
    }

    let mut escaped = String::with_capacity(path.len() + 16);
    let mut rest = path;
    while let Some(start) = rest.find('<') {
        let Some(len) = rest[start..].find('>') else {
            break;
        };
        let end = start + len + 1;
        escaped.push_str(&rest[..start]);
        escaped.extend(form_urlencoded::byte_serialize(rest[start..end].as_bytes()));
        rest = &rest[end..];
    }
    escaped.push_str(rest);
    Cow::Owned(escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_literal_zero_is_a_body() {
        let body = Body::from("0");
        assert!(!body.is_empty());
        assert_eq!(body.encode().unwrap(), Some("0".to_string()));

        assert!(Body::from("").is_empty());
        assert!(Body::Json(json!({})).is_empty());
        assert!(!Body::Json(json!(0)).is_empty());
    }

    #[test]
    fn test_escaped_slashes_are_unescaped() {
        let body = Body::Raw(r#"{"data":"aGVsbG8\/d29ybGQ="}"#.to_string());
        assert_eq!(
            body.encode().unwrap().unwrap(),
            r#"{"data":"aGVsbG8/d29ybGQ="}"#
        );
    }

    #[test]
    fn test_json_body_keeps_backslashes() {
        let query = json!({ "query": { "regexp": { "path": "a\\/b" } } });
        let encoded = Body::Json(query.clone()).encode().unwrap().unwrap();

        let decoded: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, query);
        assert_eq!(decoded["query"]["regexp"]["path"], "a\\/b");

        let lines = Body::NdJson(vec![query.clone()]).encode().unwrap().unwrap();
        let decoded: Value = serde_json::from_str(lines.trim_end()).unwrap();
        assert_eq!(decoded, query);
    }

    #[test]
    fn test_ndjson_body() {
        let body = Body::NdJson(vec![
            json!({ "index": { "_index": "logs" } }),
            json!({ "message": "hello" }),
        ]);
        assert_eq!(body.content_type(), NDJSON_CONTENT_TYPE);
        assert_eq!(
            body.encode().unwrap().unwrap(),
            "{\"index\":{\"_index\":\"logs\"}}\n{\"message\":\"hello\"}\n"
        );
    }

    #[test]
    fn test_scoped_path() {
        let request = Request::scoped(Method::GET, &["logs", "", "/_search"]);
        assert_eq!(request.path(), "logs/_search");
    }

    #[test]
    fn test_query_string() {
        let request = Request::get("_search")
            .with_query("q", "user:kimchy tags")
            .with_query("size", 10)
            .with_query("explain", true);
        assert_eq!(
            request.query_string().unwrap(),
            "q=user%3Akimchy+tags&size=10&explain=true"
        );
        assert!(request.has_query("size"));
        assert!(Request::get("_search").query_string().is_none());
    }

    #[test]
    fn test_escape_date_math() {
        assert_eq!(escape_date_math("logs/_search"), "logs/_search");
        assert_eq!(
            escape_date_math("<logs-{now/d}>/_search"),
            "%3Clogs-%7Bnow%2Fd%7D%3E/_search"
        );
        assert_eq!(
            escape_date_math("%3Clogs-%7Bnow%2Fd%7D%3E/_search"),
            "%3Clogs-%7Bnow%2Fd%7D%3E/_search"
        );
    }

    #[test]
    fn test_curl_command() {
        let connection = Connection::new("es1", 9200);
        let request = Request::post("logs/_search")
            .with_query("size", 1)
            .with_json(json!({ "query": { "match_all": {} } }));

        assert_eq!(
            request.to_curl_command(&connection),
            r#"curl -XPOST 'http://es1:9200/logs/_search?size=1' -d '{"query":{"match_all":{}}}'"#
        );
    }
}
