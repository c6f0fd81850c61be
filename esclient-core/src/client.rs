//! Client: connection selection, transport execution and failover.

use http::Method;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::transport::{Params, TransportRegistry};
use crate::{
    Body, ClientConfig, Connection, ConnectionPool, Error, Request, Response, Result,
    StrategyFactory, StrategySpec,
};

/// Elasticsearch client.
///
/// Each request goes to the connection picked by the pool's strategy. When
/// the transfer fails, that connection is disabled and the request is tried
/// on the next one until none is left.
pub struct Client {
    config: ClientConfig,
    pool: ConnectionPool,
    registry: TransportRegistry,
    last_request: Mutex<Option<Request>>,
    last_response: Mutex<Option<Response>>,
}

impl Client {
    /// Create a client with the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let strategy = StrategyFactory::new().create(config.strategy_spec())?;
        let connections = config
            .connection_configs()
            .iter()
            .map(|c| Arc::new(Connection::from_config(c)))
            .collect::<Vec<_>>();

        info!(
            "Initializing Elasticsearch client for: {:?}",
            connections.iter().map(|c| c.endpoint()).collect::<Vec<_>>()
        );

        Ok(Self {
            pool: ConnectionPool::new(connections, strategy),
            registry: TransportRegistry::new(),
            config,
            last_request: Mutex::new(None),
            last_response: Mutex::new(None),
        })
    }

    /// Create a client from a DSN, e.g. `http://localhost:9200/`.
    pub fn from_dsn(dsn: &str) -> Result<Self> {
        Self::new(ClientConfig::from_dsn(dsn)?)
    }

    /// Resolve transports through `registry`.
    pub fn with_transport_registry(mut self, registry: TransportRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the connection strategy.
    pub fn with_strategy(mut self, spec: impl Into<StrategySpec>) -> Result<Self> {
        let strategy = StrategyFactory::new().create(spec)?;
        self.pool.set_strategy(strategy);
        Ok(self)
    }

    /// Register a callback invoked after a connection is disabled.
    pub fn on_fail<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Connection, &Error, &Client) + Send + Sync + 'static,
    {
        self.pool.set_callback(Some(Arc::new(callback)));
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Get the connection pool mutably.
    pub fn pool_mut(&mut self) -> &mut ConnectionPool {
        &mut self.pool
    }

    /// Get the transport registry.
    pub fn transport_registry(&self) -> &TransportRegistry {
        &self.registry
    }

    /// Add a connection to the pool.
    pub fn add_connection(&mut self, connection: Connection) -> &mut Self {
        self.pool.add_connection(Arc::new(connection));
        self
    }

    /// Check if any connection is still enabled.
    pub fn has_connection(&self) -> bool {
        self.pool.has_connection()
    }

    /// Get the next connection the strategy would pick.
    pub fn connection(&self) -> Result<Arc<Connection>> {
        self.pool.get_connection()
    }

    /// The most recently sent request.
    pub fn last_request(&self) -> Option<Request> {
        self.last_request.lock().clone()
    }

    /// The most recently received response, including failed ones.
    pub fn last_response(&self) -> Option<Response> {
        self.last_response.lock().clone()
    }

    /// Send a request built from its parts.
    pub async fn request(
        &self,
        path: &str,
        method: Method,
        body: impl Into<Body>,
        query: &[(&str, &str)],
    ) -> Result<Response> {
        let request = Request::new(method, path)
            .with_body(body)
            .with_queries(query.iter().copied());
        self.send(request).await
    }

    /// Send a request, failing over to the next enabled connection on
    /// transfer errors.
    pub async fn send(&self, request: Request) -> Result<Response> {
        let request = self.prepare(request);
        let params: Params = request
            .query()
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        loop {
            let connection = self.pool.get_connection()?;
            let transport = self.registry.for_connection(connection.clone())?;

            if self.config.log {
                info!("{}", request.to_curl_command(&connection));
            }
            debug!(
                connection = %connection.endpoint(),
                transport = transport.name(),
                method = %request.method(),
                path = request.path(),
                "Executing request"
            );

            *self.last_request.lock() = Some(request.clone());
            let result = transport.exec(&request, &params).await;

            match result {
                Ok(response) => {
                    *self.last_response.lock() = Some(response.clone());
                    return Ok(response);
                }
                Err(err) => {
                    *self.last_response.lock() = err.response().cloned();

                    if !err.is_connection() {
                        return Err(err);
                    }

                    self.pool.on_fail(&connection, &err, self);
                    if !self.pool.has_connection() {
                        warn!(error = %err, "No connection left to retry on");
                        return Err(err);
                    }
                    debug!(error = %err, "Retrying on next connection");
                }
            }
        }
    }

    fn prepare(&self, request: Request) -> Request {
        let retries = self.config.retry_on_conflict;
        if retries > 0
            && request.path().split('/').any(|segment| segment == "_update")
            && !request.has_query("retry_on_conflict")
        {
            return request.with_query("retry_on_conflict", retries);
        }
        request
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("pool", &self.pool)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
