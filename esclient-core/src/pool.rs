//! Connection pool.

use crate::{Client, Connection, Error, Result, SimpleStrategy, Strategy};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Invoked after a connection has been disabled.
pub type FailureCallback = Arc<dyn Fn(&Connection, &Error, &Client) + Send + Sync>;

/// Owns the connections and the strategy that picks among them.
///
/// The pool never retries on its own. After [`on_fail`](Self::on_fail) the
/// caller asks for [`get_connection`](Self::get_connection) again.
#[derive(Clone)]
pub struct ConnectionPool {
    connections: Vec<Arc<Connection>>,
    strategy: Arc<dyn Strategy>,
    callback: Option<FailureCallback>,
}

impl ConnectionPool {
    /// Create a pool.
    pub fn new(connections: Vec<Arc<Connection>>, strategy: Arc<dyn Strategy>) -> Self {
        Self {
            connections,
            strategy,
            callback: None,
        }
    }

    /// Register the failure callback.
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Connection, &Error, &Client) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Replace the failure callback.
    pub fn set_callback(&mut self, callback: Option<FailureCallback>) -> &mut Self {
        self.callback = callback;
        self
    }

    /// Append a connection.
    pub fn add_connection(&mut self, connection: Arc<Connection>) -> &mut Self {
        self.connections.push(connection);
        self
    }

    /// Replace all connections.
    pub fn set_connections(&mut self, connections: Vec<Arc<Connection>>) -> &mut Self {
        self.connections = connections;
        self
    }

    /// Get all connections, enabled or not.
    pub fn connections(&self) -> &[Arc<Connection>] {
        &self.connections
    }

    /// Check if at least one connection is enabled.
    pub fn has_connection(&self) -> bool {
        self.connections.iter().any(|c| c.is_enabled())
    }

    /// Get the strategy.
    pub fn strategy(&self) -> &Arc<dyn Strategy> {
        &self.strategy
    }

    /// Replace the strategy.
    pub fn set_strategy(&mut self, strategy: Arc<dyn Strategy>) -> &mut Self {
        self.strategy = strategy;
        self
    }

    /// Pick the next connection to try.
    pub fn get_connection(&self) -> Result<Arc<Connection>> {
        self.strategy.get_connection(&self.connections)
    }

    /// Disable `connection` and notify the failure callback once.
    pub fn on_fail(&self, connection: &Connection, error: &Error, client: &Client) {
        connection.set_enabled(false);
        warn!(
            connection = %connection.endpoint(),
            error = %error,
            "Connection disabled after failure"
        );

        if let Some(callback) = &self.callback {
            callback(connection, error, client);
        }
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new(Vec::new(), Arc::new(SimpleStrategy))
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("connections", &self.connections)
            .field("strategy", &self.strategy.name())
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClientConfig, ConnectionError, Request, TransferErrorKind};
    use parking_lot::Mutex;

    fn disabled(host: &str) -> Arc<Connection> {
        let conn = Connection::new(host, 9200);
        conn.set_enabled(false);
        Arc::new(conn)
    }

    fn connection_error() -> Error {
        ConnectionError::new(
            TransferErrorKind::Connect,
            "connection refused",
            Request::get("_cluster/health"),
        )
        .into()
    }

    #[test]
    fn test_has_connection() {
        let mut pool = ConnectionPool::default();
        pool.set_connections(Vec::new());
        assert!(!pool.has_connection());

        pool.add_connection(disabled("a"));
        assert!(!pool.has_connection());

        pool.add_connection(Arc::new(Connection::new("b", 9200)));
        assert!(pool.has_connection());
    }

    #[test]
    fn test_failover_to_enabled_connection() {
        let b = Arc::new(Connection::new("b", 9200));
        let pool = ConnectionPool::new(vec![disabled("a"), b.clone()], Arc::new(SimpleStrategy));

        let picked = pool.get_connection().unwrap();
        assert!(Arc::ptr_eq(&picked, &b));
    }

    #[test]
    fn test_get_connection_propagates_strategy_error() {
        let pool = ConnectionPool::new(vec![disabled("a")], Arc::new(SimpleStrategy));
        assert!(matches!(pool.get_connection(), Err(Error::NoEnabledConnection)));
    }

    #[test]
    fn test_on_fail_disables_and_notifies_once() {
        let client = Client::new(ClientConfig::default()).unwrap();
        let seen: Arc<Mutex<Vec<(String, String, usize)>>> = Arc::default();

        let recorder = seen.clone();
        let pool = ConnectionPool::default().with_callback(move |conn, err, client| {
            recorder
                .lock()
                .push((conn.endpoint(), err.to_string(), client as *const Client as usize));
        });

        let conn = Connection::new("es1", 9200);
        let error = connection_error();
        pool.on_fail(&conn, &error, &client);

        assert!(!conn.is_enabled());
        let calls = seen.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "es1:9200");
        assert_eq!(calls[0].1, error.to_string());
        assert_eq!(calls[0].2, &client as *const Client as usize);
    }

    #[test]
    fn test_on_fail_without_callback() {
        let client = Client::new(ClientConfig::default()).unwrap();
        let pool = ConnectionPool::default();
        let conn = Connection::default();

        pool.on_fail(&conn, &connection_error(), &client);
        assert!(!conn.is_enabled());
    }
}
