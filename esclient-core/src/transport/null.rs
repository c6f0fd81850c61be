//! Transport that never touches the network.

use super::{Params, Transport};
use crate::response::classify;
use crate::{Connection, Request, Response, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::trace;

/// Returns a canned response for every request.
///
/// Without a configured response, every request gets an empty search
/// result echoing the call parameters.
///
/// ```
/// use esclient_core::{Connection, NullTransport, Params, Request, Transport};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let transport = NullTransport::new(Arc::new(Connection::default()));
/// let response = transport.exec(&Request::get("_search"), &Params::new()).await.unwrap();
/// assert_eq!(response.data()["hits"]["hits"].as_array().unwrap().len(), 0);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct NullTransport {
    connection: Arc<Connection>,
    params: Params,
    response: Option<Response>,
}

impl NullTransport {
    /// Create a null transport.
    pub fn new(connection: Arc<Connection>) -> Self {
        Self {
            connection,
            params: Params::new(),
            response: None,
        }
    }

    /// Return `response` for every request.
    pub fn with_response(mut self, response: Response) -> Self {
        self.response = Some(response);
        self
    }

    fn empty_result(params: &Params) -> Response {
        Response::from_data(
            json!({
                "took": 0,
                "timed_out": false,
                "_shards": { "total": 0, "successful": 0, "failed": 0 },
                "hits": {
                    "total": { "value": 0, "relation": "eq" },
                    "max_score": null,
                    "hits": []
                },
                "params": Value::Object(params.clone())
            }),
            200,
        )
    }
}

#[async_trait]
impl Transport for NullTransport {
    fn name(&self) -> &str {
        "NullTransport"
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

    async fn exec(&self, request: &Request, params: &Params) -> Result<Response> {
        trace!(method = %request.method(), path = request.path(), "Null transport request");
        let response = match &self.response {
            Some(response) => response.clone(),
            None => Self::empty_result(params),
        };
        classify(request, response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[tokio::test]
    async fn test_empty_result_echoes_params() {
        let transport = NullTransport::new(Arc::new(Connection::default()));
        let mut params = Params::new();
        params.insert("size".into(), json!(10));

        let response = transport
            .exec(&Request::get("_search"), &params)
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.data()["hits"]["hits"], json!([]));
        assert_eq!(response.data()["params"]["size"], 10);
        assert!(response.is_ok());
    }

    #[tokio::test]
    async fn test_canned_response_is_classified() {
        let transport = NullTransport::new(Arc::new(Connection::default()))
            .with_response(Response::new(r#"{"error": "boom"}"#, 500));

        let result = transport.exec(&Request::get("_search"), &Params::new()).await;
        assert!(matches!(result, Err(Error::Response(_))));
    }
}
