//! Name-based transport resolution.

use super::{HandleSlot, HttpTransport, NullTransport, Params, Transport};
use crate::{Connection, Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds a transport bound to a connection.
pub type TransportConstructor = Arc<dyn Fn(Arc<Connection>) -> Box<dyn Transport> + Send + Sync>;

/// What to build a transport from.
#[derive(Debug)]
pub enum TransportSpec {
    /// A ready transport; only rebound and reparameterized.
    Instance(Box<dyn Transport>),
    /// A registered name, e.g. `"Http"`.
    Name(String),
    /// A map with a `type` name plus extra transport parameters.
    Config(Params),
}

impl TransportSpec {
    /// Interpret a configuration value: a string names a transport, an
    /// object is a `type` map.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(name) => Ok(Self::Name(name.clone())),
            Value::Object(map) => Ok(Self::Config(map.clone())),
            other => Err(Error::Invalid(format!("Invalid transport: {}", other))),
        }
    }
}

impl From<&str> for TransportSpec {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for TransportSpec {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<Params> for TransportSpec {
    fn from(config: Params) -> Self {
        Self::Config(config)
    }
}

impl From<Box<dyn Transport>> for TransportSpec {
    fn from(transport: Box<dyn Transport>) -> Self {
        Self::Instance(transport)
    }
}

/// Maps transport names to constructors.
///
/// Names are case-sensitive. The default registry knows `Http`, `Https`
/// and `NullTransport`; HTTP and HTTPS each get one persistent handle slot
/// shared by every transport the registry builds.
#[derive(Clone)]
pub struct TransportRegistry {
    constructors: HashMap<String, TransportConstructor>,
}

impl TransportRegistry {
    /// Create an empty registry.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Create the default registry, with one handle slot per HTTP scheme.
    pub fn new() -> Self {
        Self::with_slots(Arc::new(HandleSlot::new()), Arc::new(HandleSlot::new()))
    }

    /// Create the default registry, with `slot` shared by HTTP and HTTPS.
    ///
    /// Pass [`HandleSlot::global`] to share the handle across registries.
    pub fn with_handle_slot(slot: Arc<HandleSlot>) -> Self {
        Self::with_slots(slot.clone(), slot)
    }

    fn with_slots(http_slot: Arc<HandleSlot>, https_slot: Arc<HandleSlot>) -> Self {
        let mut registry = Self::empty();
        registry.register("Http", move |connection| {
            Box::new(HttpTransport::http(connection).with_handle_slot(http_slot.clone()))
        });
        registry.register("Https", move |connection| {
            Box::new(HttpTransport::https(connection).with_handle_slot(https_slot.clone()))
        });
        registry.register("NullTransport", |connection| {
            Box::new(NullTransport::new(connection))
        });
        registry
    }

    /// Register a constructor under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(Arc<Connection>) -> Box<dyn Transport> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
        self
    }

    /// Check if `name` is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build a transport bound to `connection`, then apply `params`.
    ///
    /// For a config map, the `type` key names the transport and every other
    /// key is merged into `params`, overriding entries of the same name.
    pub fn create(
        &self,
        spec: impl Into<TransportSpec>,
        connection: Arc<Connection>,
        params: Params,
    ) -> Result<Box<dyn Transport>> {
        let mut params = params;
        let mut transport = match spec.into() {
            TransportSpec::Instance(mut transport) => {
                transport.set_connection(connection);
                transport
            }
            TransportSpec::Name(name) => self.construct(&name, connection)?,
            TransportSpec::Config(mut config) => {
                let name = match config.remove("type") {
                    Some(Value::String(name)) => name,
                    Some(other) => {
                        return Err(Error::Invalid(format!("Invalid transport type: {}", other)));
                    }
                    None => {
                        return Err(Error::Invalid(
                            "Transport config is missing a type".to_string(),
                        ));
                    }
                };
                params.extend(config);
                self.construct(&name, connection)?
            }
        };

        for (key, value) in params {
            transport.set_param(key, value);
        }
        Ok(transport)
    }

    /// Build the transport selected by `connection`'s own transport setting.
    pub fn for_connection(&self, connection: Arc<Connection>) -> Result<Box<dyn Transport>> {
        let spec = TransportSpec::from_value(connection.transport())?;
        self.create(spec, connection, Params::new())
    }

    fn construct(&self, name: &str, connection: Arc<Connection>) -> Result<Box<dyn Transport>> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| Error::Invalid(format!("Invalid transport: {}", name)))?;
        Ok(constructor(connection))
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("names", &self.names())
            .finish()
    }
}
