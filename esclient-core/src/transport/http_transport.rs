//! HTTP and HTTPS transport.

use super::{HandleSlot, Params, TransferOption, TransferSettings, Transport};
use crate::request::escape_date_math;
use crate::response::{TransferInfo, classify};
use crate::{Connection, ConnectionError, Error, Request, Response, Result};
use async_trait::async_trait;
use base64::Engine;
use http::{Method, header};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Plain HTTP.
    Http,
    /// HTTP over TLS.
    Https,
}

impl Scheme {
    /// Scheme string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP transport.
///
/// Persistent connections reuse the handle cached in the transport's
/// [`HandleSlot`]; other connections get a fresh handle per request.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    scheme: Scheme,
    connection: Arc<Connection>,
    params: Params,
    slot: Arc<HandleSlot>,
}

impl HttpTransport {
    /// Create an HTTP transport with its own handle slot.
    pub fn http(connection: Arc<Connection>) -> Self {
        Self::with_scheme(Scheme::Http, connection)
    }

    /// Create an HTTPS transport with its own handle slot.
    pub fn https(connection: Arc<Connection>) -> Self {
        Self::with_scheme(Scheme::Https, connection)
    }

    fn with_scheme(scheme: Scheme, connection: Arc<Connection>) -> Self {
        Self {
            scheme,
            connection,
            params: Params::new(),
            slot: Arc::new(HandleSlot::new()),
        }
    }

    /// Use `slot` for persistent handles, e.g. [`HandleSlot::global`].
    pub fn with_handle_slot(mut self, slot: Arc<HandleSlot>) -> Self {
        self.slot = slot;
        self
    }

    /// Set a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Get the scheme.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Get the handle slot.
    pub fn handle_slot(&self) -> &Arc<HandleSlot> {
        &self.slot
    }

    fn post_with_request_body(&self) -> bool {
        match self.params.get("postWithRequestBody") {
            Some(Value::Bool(on)) => *on,
            Some(Value::String(s)) => s == "true" || s == "1",
            Some(Value::Number(n)) => n.as_i64() != Some(0),
            _ => false,
        }
    }

    /// Full URL for `request`.
    pub fn build_url(&self, request: &Request) -> String {
        let mut url = self.connection.base_url(self.scheme.as_str());
        url.push_str(&escape_date_math(request.path().trim_start_matches('/')));
        if let Some(query) = request.query_string() {
            url.push('?');
            url.push_str(&query);
        }
        url
    }

    fn transfer_settings(&self) -> Result<TransferSettings> {
        let defaults: &[TransferOption] = match self.scheme {
            Scheme::Http => &[],
            Scheme::Https => &[TransferOption::HttpsOnly(true)],
        };
        TransferSettings::from_connection(&self.connection, defaults)
    }

    fn handle(&self) -> Result<reqwest::Client> {
        let settings = self.transfer_settings()?;
        if self.connection.is_persistent() {
            self.slot.acquire(&settings)
        } else {
            settings.build_client()
        }
    }

    fn method_for(&self, request: &Request) -> Method {
        if request.has_body() && self.post_with_request_body() {
            Method::POST
        } else {
            request.method().clone()
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        match self.scheme {
            Scheme::Http => "Http",
            Scheme::Https => "Https",
        }
    }

    fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    fn set_connection(&mut self, connection: Arc<Connection>) {
        self.connection = connection;
    }

    fn params(&self) -> &Params {
        &self.params
    }

    fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    async fn exec(&self, request: &Request, _params: &Params) -> Result<Response> {
        let handle = self.handle()?;
        let url = self.build_url(request);
        let method = self.method_for(request);
        // Recomputed for every request so a HEAD never leaks into the next one.
        let no_body = method == Method::HEAD;

        let mut builder = handle.request(method.clone(), url.as_str());
        for (name, value) in self.connection.headers() {
            builder = builder.header(name, value);
        }
        if let Some(username) = self.connection.username() {
            let credentials = format!("{}:{}", username, self.connection.password().unwrap_or(""));
            let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
            builder = builder.header(header::AUTHORIZATION, format!("Basic {}", encoded));
        }
        if let Some(content) = request.body().encode()? {
            builder = builder
                .header(header::CONTENT_TYPE, request.content_type())
                .body(content);
        }

        let http_request = builder
            .build()
            .map_err(|e| transfer_error(e, request))?;
        let request_headers = http_request.headers().clone();

        debug!(method = %method, url = %url, "Sending request");
        let start = Instant::now();
        let http_response = handle
            .execute(http_request)
            .await
            .map_err(|e| transfer_error(e, request))?;

        let status = http_response.status().as_u16();
        let response_headers = http_response.headers().clone();
        let primary_ip = http_response.remote_addr();

        let body = if no_body {
            String::new()
        } else {
            match http_response.text().await {
                Ok(body) => body,
                Err(e) => {
                    let partial = Response::new(String::new(), status);
                    return Err(ConnectionError::from_reqwest(e, request.clone())
                        .with_response(partial)
                        .into());
                }
            }
        };
        let elapsed = start.elapsed();

        debug!(
            method = %method,
            url = %url,
            status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Received response"
        );

        let info = TransferInfo {
            url,
            method: method.to_string(),
            http_code: status,
            request_headers,
            response_headers,
            total_time: elapsed,
            primary_ip,
            size_download: body.len(),
        };

        let response = Response::new(body, status)
            .with_query_time(elapsed)
            .with_transfer_info(info);

        classify(request, response)
    }
}

/// A request reqwest refuses to build (bad header name or value) is a
/// configuration mistake, not a failure of the connection.
fn transfer_error(error: reqwest::Error, request: &Request) -> Error {
    if error.is_builder() {
        Error::Invalid(format!("Cannot build request for {}: {}", request.path(), error))
    } else {
        ConnectionError::from_reqwest(error, request.clone()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_url() {
        let mut connection = Connection::new("es1", 9200);
        connection.set_path("cluster");
        let transport = HttpTransport::https(Arc::new(connection));

        let request = Request::get("/<logs-{now/d}>/_search").with_query("size", 0);
        assert_eq!(
            transport.build_url(&request),
            "https://es1:9200/cluster/%3Clogs-%7Bnow%2Fd%7D%3E/_search?size=0"
        );
    }

    #[test]
    fn test_post_with_request_body() {
        let connection = Arc::new(Connection::default());
        let transport = HttpTransport::http(connection).with_param("postWithRequestBody", true);

        let with_zero = Request::get("_search").with_body("0");
        assert_eq!(transport.method_for(&with_zero), Method::POST);

        let without_body = Request::get("_search");
        assert_eq!(transport.method_for(&without_body), Method::GET);
    }

    #[test]
    fn test_get_kept_without_param() {
        let transport = HttpTransport::http(Arc::new(Connection::default()));
        let request = Request::get("_search").with_json(json!({ "size": 1 }));
        assert_eq!(transport.method_for(&request), Method::GET);
    }

    #[test]
    fn test_https_requires_tls_by_default() {
        let transport = HttpTransport::https(Arc::new(Connection::default()));
        let settings = transport.transfer_settings().unwrap();
        assert!(settings.options.contains(&TransferOption::HttpsOnly(true)));
        assert_eq!(transport.name(), "Https");
    }

    #[test]
    fn test_global_slot_only_when_injected() {
        let connection = Arc::new(Connection::default());
        let private = HttpTransport::http(connection.clone());
        assert!(!Arc::ptr_eq(private.handle_slot(), &HandleSlot::global()));

        let shared = HttpTransport::https(connection).with_handle_slot(HandleSlot::global());
        assert!(Arc::ptr_eq(shared.handle_slot(), &HandleSlot::global()));
    }

    #[tokio::test]
    async fn test_get_after_head_reads_body() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/logs"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/logs/_count"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"count":7}"#))
            .expect(2)
            .mount(&server)
            .await;

        let mut connection = Connection::new("127.0.0.1", server.address().port());
        connection.set_config("proxy", "");
        let slot = Arc::new(HandleSlot::new());
        let transport = HttpTransport::http(Arc::new(connection)).with_handle_slot(slot.clone());

        for _ in 0..2 {
            let head = transport
                .exec(&Request::head("logs"), &Params::new())
                .await
                .unwrap();
            assert_eq!(head.raw(), "");

            let count = transport
                .exec(&Request::get("logs/_count"), &Params::new())
                .await
                .unwrap();
            assert_eq!(count.raw(), r#"{"count":7}"#);
            assert_eq!(count.data()["count"], 7);
            assert_eq!(count.transfer_info().unwrap().size_download, 11);
        }
        assert_eq!(slot.handles_built(), 1);
    }

    #[tokio::test]
    async fn test_bad_header_is_invalid() {
        let mut connection = Connection::new("127.0.0.1", 9200);
        connection
            .set_config("proxy", "")
            .set_config("headers", json!({ "bad header": "x" }));
        let transport = HttpTransport::http(Arc::new(connection));

        let err = transport
            .exec(&Request::get("_search"), &Params::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Invalid(_)));
        assert!(!err.is_connection());
        assert!(err.is_client_error());
    }
}
