//! Transfer settings and the persistent handle slot.

use crate::{Connection, Error, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::debug;

/// One low-level transfer option, from a connection's `curl` map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOption {
    /// `user_agent`: User-Agent header.
    UserAgent(String),
    /// `tcp_nodelay`: disable Nagle's algorithm.
    TcpNodelay(bool),
    /// `tcp_keepalive`: keepalive interval, in seconds.
    TcpKeepalive(Duration),
    /// `pool_idle_timeout`: idle socket lifetime, in seconds.
    PoolIdleTimeout(Duration),
    /// `pool_max_idle_per_host`: idle sockets kept per host.
    PoolMaxIdlePerHost(usize),
    /// `http1_only`: never negotiate HTTP/2.
    Http1Only(bool),
    /// `gzip`: accept gzip responses.
    Gzip(bool),
    /// `brotli`: accept brotli responses.
    Brotli(bool),
    /// `https_only`: refuse plain HTTP URLs.
    HttpsOnly(bool),
    /// `danger_accept_invalid_certs`: skip certificate verification.
    DangerAcceptInvalidCerts(bool),
    /// `max_redirects`: redirects to follow.
    MaxRedirects(usize),
}

impl TransferOption {
    /// Parse a `curl` map entry.
    pub fn parse(key: &str, value: &Value) -> Result<Self> {
        let option = match key {
            "user_agent" => Self::UserAgent(as_text(key, value)?),
            "tcp_nodelay" => Self::TcpNodelay(as_flag(key, value)?),
            "tcp_keepalive" => Self::TcpKeepalive(Duration::from_secs(as_count(key, value)?)),
            "pool_idle_timeout" => {
                Self::PoolIdleTimeout(Duration::from_secs(as_count(key, value)?))
            }
            "pool_max_idle_per_host" => Self::PoolMaxIdlePerHost(as_count(key, value)? as usize),
            "http1_only" => Self::Http1Only(as_flag(key, value)?),
            "gzip" => Self::Gzip(as_flag(key, value)?),
            "brotli" => Self::Brotli(as_flag(key, value)?),
            "https_only" => Self::HttpsOnly(as_flag(key, value)?),
            "danger_accept_invalid_certs" => Self::DangerAcceptInvalidCerts(as_flag(key, value)?),
            "max_redirects" => Self::MaxRedirects(as_count(key, value)? as usize),
            other => {
                return Err(Error::Invalid(format!("Unknown transfer option: {}", other)));
            }
        };
        Ok(option)
    }

    /// Option key.
    pub fn key(&self) -> &'static str {
        match self {
            Self::UserAgent(_) => "user_agent",
            Self::TcpNodelay(_) => "tcp_nodelay",
            Self::TcpKeepalive(_) => "tcp_keepalive",
            Self::PoolIdleTimeout(_) => "pool_idle_timeout",
            Self::PoolMaxIdlePerHost(_) => "pool_max_idle_per_host",
            Self::Http1Only(_) => "http1_only",
            Self::Gzip(_) => "gzip",
            Self::Brotli(_) => "brotli",
            Self::HttpsOnly(_) => "https_only",
            Self::DangerAcceptInvalidCerts(_) => "danger_accept_invalid_certs",
            Self::MaxRedirects(_) => "max_redirects",
        }
    }

    fn apply(&self, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        match self {
            Self::UserAgent(agent) => builder.user_agent(agent.as_str()),
            Self::TcpNodelay(on) => builder.tcp_nodelay(*on),
            Self::TcpKeepalive(interval) => builder.tcp_keepalive(*interval),
            Self::PoolIdleTimeout(timeout) => builder.pool_idle_timeout(*timeout),
            Self::PoolMaxIdlePerHost(max) => builder.pool_max_idle_per_host(*max),
            Self::Http1Only(true) => builder.http1_only(),
            Self::Http1Only(false) => builder,
            Self::Gzip(on) => builder.gzip(*on),
            Self::Brotli(on) => builder.brotli(*on),
            Self::HttpsOnly(on) => builder.https_only(*on),
            Self::DangerAcceptInvalidCerts(on) => builder.danger_accept_invalid_certs(*on),
            Self::MaxRedirects(max) => builder.redirect(reqwest::redirect::Policy::limited(*max)),
        }
    }
}

fn as_flag(key: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(flag) => Ok(*flag),
        Value::Number(n) => Ok(n.as_i64() != Some(0)),
        _ => Err(invalid_value(key, value)),
    }
}

fn as_count(key: &str, value: &Value) -> Result<u64> {
    value.as_u64().ok_or_else(|| invalid_value(key, value))
}

fn as_text(key: &str, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid_value(key, value))
}

fn invalid_value(key: &str, value: &Value) -> Error {
    Error::Invalid(format!("Invalid value for transfer option {}: {}", key, value))
}

/// Pick the proxy for a connection.
///
/// An explicit setting wins, and `""` disables proxying. Otherwise the
/// `http_proxy` environment value is used.
pub fn resolve_proxy(configured: Option<&str>, env_proxy: Option<String>) -> Option<String> {
    match configured {
        Some("") => None,
        Some(proxy) => Some(proxy.to_string()),
        None => env_proxy.filter(|proxy| !proxy.is_empty()),
    }
}

/// Everything a transfer handle is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSettings {
    /// Overall transfer timeout.
    pub timeout: Option<Duration>,
    /// Connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Proxy URL.
    pub proxy: Option<String>,
    /// Accept compressed responses.
    pub compression: bool,
    /// Extra options, applied in order.
    pub options: Vec<TransferOption>,
}

impl TransferSettings {
    /// Derive settings from a connection. `defaults` are overridden by the
    /// connection's own `curl` map.
    pub fn from_connection(connection: &Connection, defaults: &[TransferOption]) -> Result<Self> {
        let mut options = defaults.to_vec();
        if let Some(raw) = connection.transfer_options() {
            for (key, value) in raw {
                let option = TransferOption::parse(key, value)?;
                options.retain(|existing| existing.key() != option.key());
                options.push(option);
            }
        }

        let timeout = Some(connection.timeout()).filter(|t| !t.is_zero());
        let connect_timeout = Some(connection.connect_timeout()).filter(|t| !t.is_zero());
        let proxy = resolve_proxy(connection.proxy(), std::env::var("http_proxy").ok());

        Ok(Self {
            timeout,
            connect_timeout,
            proxy,
            compression: connection.has_compression(),
            options,
        })
    }

    /// Build a transfer handle.
    pub fn build_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().gzip(self.compression);

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        builder = match &self.proxy {
            Some(proxy) => builder.proxy(reqwest::Proxy::all(proxy.as_str()).map_err(|e| {
                Error::Invalid(format!("Invalid proxy {}: {}", proxy, e))
            })?),
            None => builder.no_proxy(),
        };

        for option in &self.options {
            builder = option.apply(builder);
        }

        builder
            .build()
            .map_err(|e| Error::Client(format!("Failed to build transfer handle: {}", e)))
    }
}

static GLOBAL_SLOT: LazyLock<Arc<HandleSlot>> = LazyLock::new(|| Arc::new(HandleSlot::new()));

/// Single-slot cache for one persistent transfer handle.
///
/// This is not a pool: at most one handle is cached. Asking for a handle
/// with different settings evicts the cached one.
#[derive(Debug, Default)]
pub struct HandleSlot {
    cached: Mutex<Option<(TransferSettings, reqwest::Client)>>,
    built: AtomicU64,
}

impl HandleSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide slot.
    ///
    /// Default transports and registries each own a private slot; this one is
    /// only shared when injected with `with_handle_slot`.
    pub fn global() -> Arc<Self> {
        GLOBAL_SLOT.clone()
    }

    /// Get the cached handle for `settings`, building it if needed.
    pub fn acquire(&self, settings: &TransferSettings) -> Result<reqwest::Client> {
        let mut cached = self.cached.lock();
        if let Some((key, client)) = cached.as_ref()
            && key == settings
        {
            return Ok(client.clone());
        }

        let client = settings.build_client()?;
        self.built.fetch_add(1, Ordering::Relaxed);
        if cached.is_some() {
            debug!("Evicting persistent transfer handle");
        }
        *cached = Some((settings.clone(), client.clone()));
        Ok(client)
    }

    /// Check if a handle is cached.
    pub fn is_occupied(&self) -> bool {
        self.cached.lock().is_some()
    }

    /// Settings of the cached handle.
    pub fn settings(&self) -> Option<TransferSettings> {
        self.cached.lock().as_ref().map(|(settings, _)| settings.clone())
    }

    /// Number of handles built through this slot.
    pub fn handles_built(&self) -> u64 {
        self.built.load(Ordering::Relaxed)
    }

    /// Drop the cached handle.
    pub fn clear(&self) {
        self.cached.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(timeout: u64) -> TransferSettings {
        TransferSettings {
            timeout: Some(Duration::from_secs(timeout)),
            connect_timeout: None,
            proxy: None,
            compression: false,
            options: Vec::new(),
        }
    }

    #[test]
    fn test_resolve_proxy() {
        let env = Some("http://env-proxy:3128".to_string());
        assert_eq!(resolve_proxy(Some("http://p:8080"), env.clone()).as_deref(), Some("http://p:8080"));
        assert_eq!(resolve_proxy(Some(""), env.clone()), None);
        assert_eq!(resolve_proxy(None, env).as_deref(), Some("http://env-proxy:3128"));
        assert_eq!(resolve_proxy(None, None), None);
        assert_eq!(resolve_proxy(None, Some(String::new())), None);
    }

    #[test]
    fn test_parse_options() {
        assert_eq!(
            TransferOption::parse("tcp_nodelay", &json!(true)).unwrap(),
            TransferOption::TcpNodelay(true)
        );
        assert_eq!(
            TransferOption::parse("pool_idle_timeout", &json!(30)).unwrap(),
            TransferOption::PoolIdleTimeout(Duration::from_secs(30))
        );
        assert!(matches!(
            TransferOption::parse("CURLOPT_SSL_VERIFYPEER", &json!(false)),
            Err(Error::Invalid(_))
        ));
        assert!(matches!(
            TransferOption::parse("max_redirects", &json!("five")),
            Err(Error::Invalid(_))
        ));
    }

    #[test]
    fn test_connection_options_override_defaults() {
        let mut connection = Connection::default();
        connection.set_config("curl", json!({ "https_only": false, "user_agent": "esclient-test/1" }));
        connection.set_config("proxy", "");

        let settings =
            TransferSettings::from_connection(&connection, &[TransferOption::HttpsOnly(true)])
                .unwrap();

        assert_eq!(settings.proxy, None);
        assert_eq!(settings.timeout, Some(Duration::from_secs(300)));
        assert_eq!(settings.connect_timeout, None);
        assert!(settings.options.contains(&TransferOption::HttpsOnly(false)));
        assert!(!settings.options.contains(&TransferOption::HttpsOnly(true)));
        assert!(settings.options.contains(&TransferOption::UserAgent("esclient-test/1".into())));
    }

    #[test]
    fn test_slot_reuses_matching_handle() {
        let slot = HandleSlot::new();
        assert!(!slot.is_occupied());

        slot.acquire(&settings(10)).unwrap();
        slot.acquire(&settings(10)).unwrap();

        assert!(slot.is_occupied());
        assert_eq!(slot.handles_built(), 1);
    }

    #[test]
    fn test_slot_holds_at_most_one_handle() {
        let slot = HandleSlot::new();

        slot.acquire(&settings(10)).unwrap();
        slot.acquire(&settings(20)).unwrap();
        assert_eq!(slot.handles_built(), 2);
        assert_eq!(slot.settings(), Some(settings(20)));

        slot.acquire(&settings(10)).unwrap();
        assert_eq!(slot.handles_built(), 3);

        slot.clear();
        assert!(!slot.is_occupied());
    }
}
