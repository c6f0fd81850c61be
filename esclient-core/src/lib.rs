//! # esclient-core
//!
//! Connection pool, failover strategies and transports for Elasticsearch
//! clients.
//!
//! ## Features
//!
//! - **Connection Pool**: Pluggable strategies (`Simple`, `RoundRobin`, callbacks)
//! - **Failover**: Failed connections are disabled and the request moves on
//! - **Transports**: HTTP/HTTPS over `reqwest`, plus a network-free `NullTransport`
//! - **Persistent Handles**: One reusable transfer handle per slot
//! - **Typed Errors**: Connection failures, error responses and partial shard
//!   failures are distinct error kinds
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use esclient_core::{Client, ClientConfig, Method};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(ClientConfig::default())?;
//!
//!     let response = client
//!         .request("logs/_search", Method::GET, json!({ "size": 10 }), &[])
//!         .await?;
//!
//!     println!("took: {:?}", response.engine_time());
//!     Ok(())
//! }
//! ```
//!
//! ## Failover
//!
//! ```rust,no_run
//! use esclient_core::{Client, ClientConfig, ConnectionConfig, Request};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .connection(ConnectionConfig { host: "es1".into(), ..Default::default() })
//!         .connection(ConnectionConfig { host: "es2".into(), ..Default::default() })
//!         .round_robin(true)
//!         .build();
//!
//!     let client = Client::new(config)?.on_fail(|connection, error, _client| {
//!         eprintln!("{} is down: {}", connection.endpoint(), error);
//!     });
//!
//!     let health = client.send(Request::get("_cluster/health")).await?;
//!     println!("{}", health.data()["status"]);
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod connection;
mod error;
mod pool;
mod request;
mod response;
mod strategy;
pub mod transport;

pub use client::Client;
pub use config::{ClientConfig, ClientConfigBuilder, ConnectionConfig};
pub use connection::{
    Connection, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_TIMEOUT_SECS, DEFAULT_TRANSPORT,
};
pub use error::{
    ConnectionError, ElasticsearchError, Error, PartialShardFailureError, ResponseError, Result,
    TransferErrorKind,
};
pub use pool::{ConnectionPool, FailureCallback};
pub use request::{Body, JSON_CONTENT_TYPE, NDJSON_CONTENT_TYPE, Request, escape_date_math};
pub use response::{Response, ShardStats, TransferInfo, classify};
pub use strategy::{
    CallbackStrategy, RoundRobinStrategy, SimpleStrategy, Strategy, StrategyCallback,
    StrategyConstructor, StrategyFactory, StrategySpec,
};
pub use transport::{
    HandleSlot, HttpTransport, NullTransport, Params, Scheme, Transport, TransportRegistry,
    TransportSpec,
};

// Re-export common types
pub use http::{HeaderMap, Method, StatusCode, header};
pub use url::Url;

/// Prelude for common imports.
///
/// ```
/// use esclient_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::client::Client;
    pub use crate::config::{ClientConfig, ConnectionConfig};
    pub use crate::connection::Connection;
    pub use crate::error::{Error, Result};
    pub use crate::pool::ConnectionPool;
    pub use crate::request::{Body, Request};
    pub use crate::response::Response;
    pub use crate::strategy::{Strategy, StrategySpec};
    pub use crate::transport::{Transport, TransportRegistry};
    pub use http::Method;
}
