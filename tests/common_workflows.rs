//! Integration tests for common client workflows.
//!
//! These tests verify that the most common use cases work correctly.

use esclient::prelude::*;
use esclient::{NullTransport, Params, TransportSpec};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// Configuration Tests
// =============================================================================

#[tokio::test]
async fn test_client_from_dsn() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/_cluster/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "green" })))
        .expect(2)
        .mount(&server)
        .await;

    let dsn = format!(
        "http://127.0.0.1:{}/search?persistent=false&timeout=5&proxy=",
        server.address().port()
    );
    let client = Client::from_dsn(&dsn).unwrap();

    for _ in 0..2 {
        let health = client.send(Request::get("_cluster/health")).await.unwrap();
        assert_eq!(health.data()["status"], "green");
    }
    assert!(!client.pool().connections()[0].is_persistent());
}

#[test]
fn test_config_file_formats() {
    let toml = ClientConfig::from_toml_str(
        r#"
        host = "es1"
        connectionStrategy = "RoundRobin"
        "#,
    )
    .unwrap();
    let json = ClientConfig::from_json(r#"{"host": "es1", "connectionStrategy": "RoundRobin"}"#)
        .unwrap();

    assert_eq!(toml, json);
    assert_eq!(
        Client::new(toml).unwrap().pool().strategy().name(),
        "RoundRobin"
    );
}

// =============================================================================
// Strategy Tests
// =============================================================================

#[tokio::test]
async fn test_callback_strategy_picks_connection() {
    let config = ClientConfig::builder()
        .connection(ConnectionConfig {
            host: "es1".into(),
            transport: json!("NullTransport"),
            ..Default::default()
        })
        .connection(ConnectionConfig {
            host: "es2".into(),
            transport: json!("NullTransport"),
            ..Default::default()
        })
        .build();

    let client = Client::new(config)
        .unwrap()
        .with_strategy(StrategySpec::callback(|connections| {
            connections.iter().rev().find(|c| c.is_enabled()).cloned()
        }))
        .unwrap();

    assert_eq!(client.connection().unwrap().host(), "es2");
    let response = client.send(Request::get("_search")).await.unwrap();
    assert!(response.is_ok());
}

// =============================================================================
// Transport Tests
// =============================================================================

#[tokio::test]
async fn test_custom_transport_registration() {
    let mut registry = TransportRegistry::new();
    registry.register("Canned", |connection| {
        Box::new(
            NullTransport::new(connection)
                .with_response(Response::from_data(json!({ "count": 12 }), 200)),
        )
    });

    let config = ClientConfig::builder().transport("Canned").build();
    let client = Client::new(config)
        .unwrap()
        .with_transport_registry(registry);

    let response = client
        .request("logs/_count", Method::GET, Body::Empty, &[])
        .await
        .unwrap();
    assert_eq!(response.data()["count"], 12);
}

#[test]
fn test_transport_from_config_value() {
    let registry = TransportRegistry::new();
    let connection = Arc::new(Connection::default());

    let spec =
        TransportSpec::from_value(&json!({ "type": "Https", "postWithRequestBody": true })).unwrap();
    let transport = registry.create(spec, connection.clone(), Params::new()).unwrap();

    assert_eq!(transport.name(), "Https");
    assert!(Arc::ptr_eq(transport.connection(), &connection));
    assert_eq!(transport.param("postWithRequestBody"), Some(&json!(true)));
}

#[test]
fn test_unknown_transport_is_invalid() {
    let config = ClientConfig::builder().transport("Thrift").build();
    let client = Client::new(config).unwrap();

    let err = tokio_test::block_on(client.send(Request::get("_search"))).unwrap_err();
    assert!(matches!(err, Error::Invalid(_)));
    assert!(client.has_connection());
}
