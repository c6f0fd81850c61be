//! Client and connection configuration.

use crate::connection::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_TIMEOUT_SECS, DEFAULT_TRANSPORT};
use crate::strategy::StrategySpec;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use url::Url;

/// Configuration of one connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionConfig {
    /// Host name.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Path prefix.
    pub path: String,
    /// Full base URL, overriding host, port and path.
    pub url: Option<String>,
    /// Transport name, or a map with a `type` key and transport parameters.
    pub transport: Value,
    /// Reuse one persistent transfer handle.
    pub persistent: bool,
    /// Transfer timeout in seconds, 0 for none.
    pub timeout: u64,
    /// Connect timeout in seconds, 0 for none.
    pub connect_timeout: u64,
    /// Proxy URL; an empty string disables proxying.
    pub proxy: Option<String>,
    /// Headers sent with every request.
    pub headers: BTreeMap<String, String>,
    /// Low-level transfer options.
    pub curl: Map<String, Value>,
    /// Basic auth user.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Accept gzip-compressed responses.
    pub compression: bool,
    /// Whether the connection starts enabled.
    pub enabled: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            path: String::new(),
            url: None,
            transport: Value::String(DEFAULT_TRANSPORT.to_string()),
            persistent: true,
            timeout: DEFAULT_TIMEOUT_SECS,
            connect_timeout: 0,
            proxy: None,
            headers: BTreeMap::new(),
            curl: Map::new(),
            username: None,
            password: None,
            compression: false,
            enabled: true,
        }
    }
}

/// Client configuration.
///
/// The top-level connection keys describe the default connection, used when
/// `connections` is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    /// Default connection.
    #[serde(flatten)]
    pub connection: ConnectionConfig,
    /// Explicit connections.
    pub connections: Vec<ConnectionConfig>,
    /// Pick connections in random order.
    pub round_robin: bool,
    /// Strategy name, overriding `round_robin`.
    pub connection_strategy: Option<String>,
    /// Log every request as a curl command.
    pub log: bool,
    /// Retries for version conflicts on update requests, 0 to leave unset.
    pub retry_on_conflict: u32,
}

impl ClientConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Parse a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))
    }

    /// Parse a JSON document.
    pub fn from_json(input: &str) -> Result<Self> {
        serde_json::from_str(input)
            .map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))
    }

    /// Load a `.json` or `.toml` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&input),
            _ => Self::from_toml_str(&input),
        }
    }

    /// Parse a DSN such as
    /// `https://user:pw@host:9201/prefix?persistent=false&timeout=5`.
    ///
    /// The scheme selects the `Http` or `Https` transport. Query keys are the
    /// scalar config keys.
    pub fn from_dsn(dsn: &str) -> Result<Self> {
        let url = Url::parse(dsn).map_err(|e| Error::Config(format!("Invalid DSN {}: {}", dsn, e)))?;

        let mut config = Self::default();
        let connection = &mut config.connection;
        connection.transport = match url.scheme() {
            "http" => Value::String("Http".to_string()),
            "https" => Value::String("Https".to_string()),
            other => return Err(Error::Config(format!("Unsupported DSN scheme: {}", other))),
        };
        if let Some(host) = url.host_str() {
            connection.host = host.to_string();
        }
        connection.port = url.port().unwrap_or(DEFAULT_PORT);
        connection.path = url.path().trim_matches('/').to_string();
        if !url.username().is_empty() {
            connection.username = Some(percent_decode(url.username())?);
            connection.password = url.password().map(percent_decode).transpose()?;
        }

        for (key, value) in url.query_pairs() {
            config.apply_dsn_option(&key, &value)?;
        }
        Ok(config)
    }

    fn apply_dsn_option(&mut self, key: &str, value: &str) -> Result<()> {
        let connection = &mut self.connection;
        match key {
            "persistent" => connection.persistent = parse_flag(key, value)?,
            "timeout" => connection.timeout = parse_number(key, value)?,
            "connectTimeout" => connection.connect_timeout = parse_number(key, value)?,
            "compression" => connection.compression = parse_flag(key, value)?,
            "proxy" => connection.proxy = Some(value.to_string()),
            "transport" => connection.transport = Value::String(value.to_string()),
            "roundRobin" => self.round_robin = parse_flag(key, value)?,
            "connectionStrategy" => self.connection_strategy = Some(value.to_string()),
            "log" => self.log = parse_flag(key, value)?,
            "retryOnConflict" => self.retry_on_conflict = parse_number(key, value)?,
            other => return Err(Error::Config(format!("Unknown DSN option: {}", other))),
        }
        Ok(())
    }

    /// Connections to put in the pool.
    pub fn connection_configs(&self) -> Vec<ConnectionConfig> {
        if self.connections.is_empty() {
            vec![self.connection.clone()]
        } else {
            self.connections.clone()
        }
    }

    /// Strategy to build: an explicit name wins over `round_robin`.
    pub fn strategy_spec(&self) -> StrategySpec {
        match &self.connection_strategy {
            Some(name) => StrategySpec::Name(name.clone()),
            None if self.round_robin => StrategySpec::Name("RoundRobin".to_string()),
            None => StrategySpec::Name("Simple".to_string()),
        }
    }
}

/// Decode URL userinfo. `+` is a literal plus here, not a space.
fn percent_decode(input: &str) -> Result<String> {
    percent_encoding::percent_decode_str(input)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| Error::Config("Invalid UTF-8 in DSN credentials".to_string()))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(Error::Config(format!("Invalid value for {}: {}", key, other))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("Invalid value for {}: {}", key, value)))
}

/// Builder for client configuration.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the default connection's host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.connection.host = host.into();
        self
    }

    /// Set the default connection's port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.connection.port = port;
        self
    }

    /// Set the default connection's path prefix.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.connection.path = path.into();
        self
    }

    /// Set the default connection's full base URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.connection.url = Some(url.into());
        self
    }

    /// Set the default connection's transport.
    pub fn transport(mut self, transport: impl Into<Value>) -> Self {
        self.config.connection.transport = transport.into();
        self
    }

    /// Enable or disable the persistent transfer handle.
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.config.connection.persistent = persistent;
        self
    }

    /// Set the transfer timeout in seconds.
    pub fn timeout(mut self, secs: u64) -> Self {
        self.config.connection.timeout = secs;
        self
    }

    /// Set the connect timeout in seconds.
    pub fn connect_timeout(mut self, secs: u64) -> Self {
        self.config.connection.connect_timeout = secs;
        self
    }

    /// Set the proxy. An empty string disables proxying.
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.config.connection.proxy = Some(proxy.into());
        self
    }

    /// Add a header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.connection.headers.insert(name.into(), value.into());
        self
    }

    /// Set a low-level transfer option.
    pub fn curl_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.connection.curl.insert(key.into(), value.into());
        self
    }

    /// Set basic auth credentials.
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.connection.username = Some(username.into());
        self.config.connection.password = Some(password.into());
        self
    }

    /// Accept gzip-compressed responses.
    pub fn compression(mut self, compression: bool) -> Self {
        self.config.connection.compression = compression;
        self
    }

    /// Add an explicit connection.
    pub fn connection(mut self, connection: ConnectionConfig) -> Self {
        self.config.connections.push(connection);
        self
    }

    /// Pick connections in random order.
    pub fn round_robin(mut self, round_robin: bool) -> Self {
        self.config.round_robin = round_robin;
        self
    }

    /// Set the strategy by name.
    pub fn connection_strategy(mut self, name: impl Into<String>) -> Self {
        self.config.connection_strategy = Some(name.into());
        self
    }

    /// Log every request as a curl command.
    pub fn log(mut self, log: bool) -> Self {
        self.config.log = log;
        self
    }

    /// Set retries for version conflicts on update requests.
    pub fn retry_on_conflict(mut self, retries: u32) -> Self {
        self.config.retry_on_conflict = retries;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
