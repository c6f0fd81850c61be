//! Connection selection strategies.
//!
//! A strategy picks one connection out of the pool's list. Built-in strategies
//! never return a disabled connection; a [`CallbackStrategy`] is trusted to
//! filter on its own.

use crate::{Connection, Error, Result};
use rand::seq::SliceRandom;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Selects the next connection to try.
pub trait Strategy: Send + Sync + fmt::Debug {
    /// Pick a connection from `connections`.
    fn get_connection(&self, connections: &[Arc<Connection>]) -> Result<Arc<Connection>>;

    /// Strategy name, for logs.
    fn name(&self) -> &str;
}

/// First enabled connection, in list order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleStrategy;

impl Strategy for SimpleStrategy {
    fn get_connection(&self, connections: &[Arc<Connection>]) -> Result<Arc<Connection>> {
        connections
            .iter()
            .find(|connection| connection.is_enabled())
            .cloned()
            .ok_or(Error::NoEnabledConnection)
    }

    fn name(&self) -> &str {
        "Simple"
    }
}

/// Shuffles a copy of the list on every call, then picks the first enabled.
///
/// There is no rotating pointer: each call is independent.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobinStrategy;

impl Strategy for RoundRobinStrategy {
    fn get_connection(&self, connections: &[Arc<Connection>]) -> Result<Arc<Connection>> {
        let mut shuffled = connections.to_vec();
        shuffled.shuffle(&mut rand::rng());
        SimpleStrategy.get_connection(&shuffled)
    }

    fn name(&self) -> &str {
        "RoundRobin"
    }
}

/// User-supplied selection function.
///
/// Receives every connection, disabled ones included.
pub type StrategyCallback =
    Arc<dyn Fn(&[Arc<Connection>]) -> Option<Arc<Connection>> + Send + Sync>;

/// Delegates selection to a [`StrategyCallback`].
#[derive(Clone)]
pub struct CallbackStrategy {
    callback: StrategyCallback,
}

impl CallbackStrategy {
    /// Wrap a selection function.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&[Arc<Connection>]) -> Option<Arc<Connection>> + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Get the wrapped callback.
    pub fn callback(&self) -> &StrategyCallback {
        &self.callback
    }
}

impl From<StrategyCallback> for CallbackStrategy {
    fn from(callback: StrategyCallback) -> Self {
        Self { callback }
    }
}

impl Strategy for CallbackStrategy {
    fn get_connection(&self, connections: &[Arc<Connection>]) -> Result<Arc<Connection>> {
        (self.callback)(connections).ok_or(Error::NoEnabledConnection)
    }

    fn name(&self) -> &str {
        "Callback"
    }
}

impl fmt::Debug for CallbackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackStrategy").finish_non_exhaustive()
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Ways to specify a strategy.
pub enum StrategySpec {
    /// A ready strategy, used as-is.
    Instance(Arc<dyn Strategy>),
    /// A selection function, wrapped in a [`CallbackStrategy`].
    Callback(StrategyCallback),
    /// A registered name, e.g. `"Simple"` or `"RoundRobin"`.
    Name(String),
}

impl StrategySpec {
    /// Build a callback spec from a closure.
    pub fn callback<F>(callback: F) -> Self
    where
        F: Fn(&[Arc<Connection>]) -> Option<Arc<Connection>> + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(callback))
    }
}

impl From<&str> for StrategySpec {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for StrategySpec {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<Arc<dyn Strategy>> for StrategySpec {
    fn from(strategy: Arc<dyn Strategy>) -> Self {
        Self::Instance(strategy)
    }
}

impl From<StrategyCallback> for StrategySpec {
    fn from(callback: StrategyCallback) -> Self {
        Self::Callback(callback)
    }
}

impl fmt::Debug for StrategySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(strategy) => f.debug_tuple("Instance").field(strategy).finish(),
            Self::Callback(_) => f.write_str("Callback(..)"),
            Self::Name(name) => f.debug_tuple("Name").field(name).finish(),
        }
    }
}

/// Constructor registered under a strategy name.
pub type StrategyConstructor = fn() -> Arc<dyn Strategy>;

/// Resolves [`StrategySpec`]s to strategies.
///
/// Names are looked up in an explicit, case-sensitive registry.
#[derive(Debug, Clone)]
pub struct StrategyFactory {
    registry: HashMap<String, StrategyConstructor>,
}

impl StrategyFactory {
    /// Create a factory knowing `Simple` and `RoundRobin`.
    pub fn new() -> Self {
        let mut factory = Self {
            registry: HashMap::new(),
        };
        factory.register("Simple", || Arc::new(SimpleStrategy) as Arc<dyn Strategy>);
        factory.register("RoundRobin", || Arc::new(RoundRobinStrategy) as Arc<dyn Strategy>);
        factory
    }

    /// Register a strategy under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, constructor: StrategyConstructor) -> &mut Self {
        self.registry.insert(name.into(), constructor);
        self
    }

    /// Check if a name is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.contains_key(name)
    }

    /// Create a strategy.
    pub fn create(&self, spec: impl Into<StrategySpec>) -> Result<Arc<dyn Strategy>> {
        match spec.into() {
            StrategySpec::Instance(strategy) => Ok(strategy),
            StrategySpec::Callback(callback) => Ok(Arc::new(CallbackStrategy::from(callback))),
            StrategySpec::Name(name) => self
                .registry
                .get(&name)
                .map(|constructor| constructor())
                .ok_or_else(|| Error::Invalid(format!("Unknown connection strategy: {}", name))),
        }
    }

    /// Create a strategy from a configuration value. Only strings are accepted.
    pub fn from_value(&self, value: &Value) -> Result<Arc<dyn Strategy>> {
        match value {
            Value::String(name) => self.create(name.as_str()),
            other => Err(Error::Invalid(format!(
                "Connection strategy must be a name, got: {}",
                other
            ))),
        }
    }
}

impl Default for StrategyFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn connections(enabled: &[bool]) -> Vec<Arc<Connection>> {
        enabled
            .iter()
            .enumerate()
            .map(|(i, &on)| {
                let conn = Connection::new(format!("node-{}", i), 9200);
                conn.set_enabled(on);
                Arc::new(conn)
            })
            .collect()
    }

    #[test]
    fn test_simple_skips_disabled() {
        let list = connections(&[false, true, true]);
        let picked = SimpleStrategy.get_connection(&list).unwrap();
        assert!(Arc::ptr_eq(&picked, &list[1]));
    }

    #[test]
    fn test_simple_fails_without_enabled() {
        let list = connections(&[false, false]);
        let err = SimpleStrategy.get_connection(&list).unwrap_err();
        assert!(matches!(err, Error::NoEnabledConnection));
        assert!(err.is_client_error());

        assert!(SimpleStrategy.get_connection(&[]).is_err());
    }

    #[test]
    fn test_round_robin_only_returns_enabled_members() {
        let list = connections(&[true, false, true, false, true]);
        for _ in 0..50 {
            let picked = RoundRobinStrategy.get_connection(&list).unwrap();
            assert!(picked.is_enabled());
            assert!(list.iter().any(|c| Arc::ptr_eq(c, &picked)));
        }
    }

    #[test]
    fn test_round_robin_does_not_reorder_input() {
        let list = connections(&[true, true, true, true]);
        let hosts: Vec<String> = list.iter().map(|c| c.host().to_string()).collect();
        for _ in 0..10 {
            RoundRobinStrategy.get_connection(&list).unwrap();
        }
        let after: Vec<String> = list.iter().map(|c| c.host().to_string()).collect();
        assert_eq!(hosts, after);
    }

    #[test]
    fn test_round_robin_fails_without_enabled() {
        let list = connections(&[false, false, false]);
        assert!(matches!(
            RoundRobinStrategy.get_connection(&list),
            Err(Error::NoEnabledConnection)
        ));
    }

    #[test]
    fn test_callback_sees_disabled_connections() {
        let list = connections(&[false, true]);
        let strategy = CallbackStrategy::new(|all| all.first().cloned());
        let picked = strategy.get_connection(&list).unwrap();
        assert!(!picked.is_enabled());
    }

    #[test]
    fn test_factory_names() {
        let factory = StrategyFactory::new();
        assert_eq!(factory.create("Simple").unwrap().name(), "Simple");
        assert_eq!(factory.create("RoundRobin").unwrap().name(), "RoundRobin");
    }

    #[test]
    fn test_factory_is_case_sensitive() {
        let factory = StrategyFactory::new();
        assert!(matches!(factory.create("simple"), Err(Error::Invalid(_))));
        assert!(matches!(factory.create("StrategyFactory"), Err(Error::Invalid(_))));
    }

    #[test]
    fn test_factory_callback_and_instance() {
        let factory = StrategyFactory::new();

        let callback = factory
            .create(StrategySpec::callback(|all| all.last().cloned()))
            .unwrap();
        assert_eq!(callback.name(), "Callback");

        let instance: Arc<dyn Strategy> = Arc::new(RoundRobinStrategy);
        let created = factory.create(instance.clone()).unwrap();
        assert!(Arc::ptr_eq(&created, &instance));
    }

    #[test]
    fn test_factory_rejects_non_name_values() {
        let factory = StrategyFactory::new();
        assert!(matches!(factory.from_value(&json!(42)), Err(Error::Invalid(_))));
        assert!(matches!(
            factory.from_value(&json!({ "type": "Simple" })),
            Err(Error::Invalid(_))
        ));
        assert_eq!(factory.from_value(&json!("Simple")).unwrap().name(), "Simple");
    }

    #[test]
    fn test_factory_register() {
        #[derive(Debug)]
        struct LastEnabled;

        impl Strategy for LastEnabled {
            fn get_connection(&self, connections: &[Arc<Connection>]) -> Result<Arc<Connection>> {
                connections
                    .iter()
                    .rev()
                    .find(|c| c.is_enabled())
                    .cloned()
                    .ok_or(Error::NoEnabledConnection)
            }

            fn name(&self) -> &str {
                "LastEnabled"
            }
        }

        let mut factory = StrategyFactory::new();
        factory.register("LastEnabled", || Arc::new(LastEnabled) as Arc<dyn Strategy>);

        let list = connections(&[true, true, false]);
        let picked = factory.create("LastEnabled").unwrap().get_connection(&list).unwrap();
        assert!(Arc::ptr_eq(&picked, &list[1]));
    }
}
