//! Connection endpoints.

use crate::config::ConnectionConfig;
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Default host.
pub const DEFAULT_HOST: &str = "localhost";
/// Default port.
pub const DEFAULT_PORT: u16 = 9200;
/// Default transport name.
pub const DEFAULT_TRANSPORT: &str = "Http";
/// Default transfer timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// One reachable endpoint.
///
/// Everything except the enabled flag is fixed once the connection is shared
/// with a pool. The flag is flipped by [`ConnectionPool::on_fail`](crate::ConnectionPool::on_fail).
#[derive(Debug)]
pub struct Connection {
    host: String,
    port: u16,
    path: String,
    transport: Value,
    config: Map<String, Value>,
    enabled: AtomicBool,
    persistent: bool,
    timeout: Duration,
    connect_timeout: Duration,
    username: Option<String>,
    password: Option<String>,
    compression: bool,
}

impl Connection {
    /// Create a connection to `host:port` with default settings.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            path: String::new(),
            transport: Value::String(DEFAULT_TRANSPORT.to_string()),
            config: Map::new(),
            enabled: AtomicBool::new(true),
            persistent: true,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::ZERO,
            username: None,
            password: None,
            compression: false,
        }
    }

    /// Build a connection from its configuration.
    pub fn from_config(config: &ConnectionConfig) -> Self {
        let mut extra = Map::new();
        if let Some(url) = &config.url {
            extra.insert("url".into(), Value::String(url.clone()));
        }
        if let Some(proxy) = &config.proxy {
            extra.insert("proxy".into(), Value::String(proxy.clone()));
        }
        if !config.headers.is_empty() {
            extra.insert("headers".into(), json!(config.headers));
        }
        if !config.curl.is_empty() {
            extra.insert("curl".into(), Value::Object(config.curl.clone()));
        }

        Self {
            host: config.host.clone(),
            port: config.port,
            path: config.path.clone(),
            transport: config.transport.clone(),
            config: extra,
            enabled: AtomicBool::new(config.enabled),
            persistent: config.persistent,
            timeout: Duration::from_secs(config.timeout),
            connect_timeout: Duration::from_secs(config.connect_timeout),
            username: config.username.clone(),
            password: config.password.clone(),
            compression: config.compression,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Set the host.
    pub fn set_host(&mut self, host: impl Into<String>) -> &mut Self {
        self.host = host.into();
        self
    }

    /// Get the port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Set the port.
    pub fn set_port(&mut self, port: u16) -> &mut Self {
        self.port = port;
        self
    }

    /// Get the path prefix.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Set the path prefix.
    pub fn set_path(&mut self, path: impl Into<String>) -> &mut Self {
        self.path = path.into();
        self
    }

    /// Get the transport selector (a name or a `{type, ...}` map).
    pub fn transport(&self) -> &Value {
        &self.transport
    }

    /// Set the transport selector.
    pub fn set_transport(&mut self, transport: impl Into<Value>) -> &mut Self {
        self.transport = transport.into();
        self
    }

    /// Check if the connection is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Enable or disable the connection. Last write wins.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Check if transfer handles should be reused.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Set whether transfer handles should be reused.
    pub fn set_persistent(&mut self, persistent: bool) -> &mut Self {
        self.persistent = persistent;
        self
    }

    /// Get the overall transfer timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Set the overall transfer timeout.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Get the connect timeout. Zero means unset.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Set the connect timeout.
    pub fn set_connect_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.connect_timeout = timeout;
        self
    }

    /// Get the basic auth username.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Get the basic auth password.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Set basic auth credentials.
    pub fn set_basic_auth(
        &mut self,
        username: impl Into<String>,
        password: Option<String>,
    ) -> &mut Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    /// Check if compressed responses are accepted.
    pub fn has_compression(&self) -> bool {
        self.compression
    }

    /// Accept compressed responses.
    pub fn set_compression(&mut self, compression: bool) -> &mut Self {
        self.compression = compression;
        self
    }

    // =========================================================================
    // Config map
    // =========================================================================

    /// Check if a config key is present.
    pub fn has_config(&self, key: &str) -> bool {
        self.config.contains_key(key)
    }

    /// Get a config value.
    pub fn config(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    /// Get the whole config map.
    pub fn config_map(&self) -> &Map<String, Value> {
        &self.config
    }

    /// Set a config value.
    pub fn set_config(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Full URL override, if configured.
    pub fn url(&self) -> Option<&str> {
        self.config("url").and_then(Value::as_str).filter(|u| !u.is_empty())
    }

    /// Explicit proxy setting. `Some("")` disables proxying.
    pub fn proxy(&self) -> Option<&str> {
        self.config("proxy").and_then(Value::as_str)
    }

    /// Extra headers sent with every request.
    pub fn headers(&self) -> Vec<(String, String)> {
        self.config("headers")
            .and_then(Value::as_object)
            .map(|headers| {
                headers
                    .iter()
                    .map(|(name, value)| {
                        let value = match value {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (name.clone(), value)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Raw transfer options passed through to the HTTP handle.
    pub fn transfer_options(&self) -> Option<&Map<String, Value>> {
        self.config("curl").and_then(Value::as_object)
    }

    /// Base URI for `scheme`, ending with a slash.
    ///
    /// The `url` config value wins over `scheme://host:port/path`.
    pub fn base_url(&self, scheme: &str) -> String {
        let mut base = match self.url() {
            Some(url) => url.to_string(),
            None => {
                let path = self.path.trim_matches('/');
                if path.is_empty() {
                    format!("{}://{}:{}/", scheme, self.host, self.port)
                } else {
                    format!("{}://{}:{}/{}", scheme, self.host, self.port, path)
                }
            }
        };
        if !base.ends_with('/') {
            base.push('/');
        }
        base
    }

    /// Short `host:port` label for logs.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connection settings as transport params.
    pub fn to_params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("host".into(), json!(self.host));
        params.insert("port".into(), json!(self.port));
        params.insert("path".into(), json!(self.path));
        params.insert("transport".into(), self.transport.clone());
        params.insert("persistent".into(), json!(self.persistent));
        params.insert("timeout".into(), json!(self.timeout.as_secs()));
        params.insert("connectTimeout".into(), json!(self.connect_timeout.as_secs()));
        params.insert("enabled".into(), json!(self.is_enabled()));
        params.insert("config".into(), Value::Object(self.config.clone()));
        params
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            port: self.port,
            path: self.path.clone(),
            transport: self.transport.clone(),
            config: self.config.clone(),
            enabled: AtomicBool::new(self.is_enabled()),
            persistent: self.persistent,
            timeout: self.timeout,
            connect_timeout: self.connect_timeout,
            username: self.username.clone(),
            password: self.password.clone(),
            compression: self.compression,
        }
    }
}
