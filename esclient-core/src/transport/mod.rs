//! Transports: execute one request against one bound connection.
//!
//! - [`HttpTransport`]: HTTP and HTTPS over `reqwest`
//! - [`NullTransport`]: canned responses, no network I/O
//!
//! Transports are resolved by name through a [`TransportRegistry`].

mod handle;
mod http_transport;
mod null;
mod registry;

pub use self::handle::{HandleSlot, TransferOption, TransferSettings, resolve_proxy};
pub use self::http_transport::{HttpTransport, Scheme};
pub use self::null::NullTransport;
pub use self::registry::{TransportConstructor, TransportRegistry, TransportSpec};

use crate::{Connection, Request, Response, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Transport-specific parameters, e.g. `postWithRequestBody`.
pub type Params = Map<String, Value>;

/// Executes requests against a bound connection.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Transport name, as registered.
    fn name(&self) -> &str;

    /// Get the bound connection.
    fn connection(&self) -> &Arc<Connection>;

    /// Bind a connection.
    fn set_connection(&mut self, connection: Arc<Connection>);

    /// Get the parameters.
    fn params(&self) -> &Params;

    /// Get the parameters mutably.
    fn params_mut(&mut self) -> &mut Params;

    /// Execute `request`. `params` are per-call parameters.
    async fn exec(&self, request: &Request, params: &Params) -> Result<Response>;

    /// Get a parameter.
    fn param(&self, key: &str) -> Option<&Value> {
        self.params().get(key)
    }

    /// Check if a parameter is set.
    fn has_param(&self, key: &str) -> bool {
        self.params().contains_key(key)
    }

    /// Set a parameter.
    fn set_param(&mut self, key: String, value: Value) {
        self.params_mut().insert(key, value);
    }
}
