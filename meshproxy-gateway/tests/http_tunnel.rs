//! Full tunnel over the HTTP mesh transport

use axum::{routing::get, Router};
use meshproxy_client::{ClientProxy, MappingTable, ProxyOptions};
use meshproxy_core::MeshContext;
use meshproxy_gateway::{GatewayOptions, ServerGateway};
use meshproxy_transport::{HttpTransport, HttpTransportConfig, MeshTransport};
use meshproxy_types::LocalIdentity;
use std::sync::Arc;
use std::time::Duration;

fn transport_config(seeds: Vec<String>) -> HttpTransportConfig {
    HttpTransportConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        seed_peers: seeds,
        max_attempts: 2,
        retry_backoff: Duration::from_millis(50),
        request_timeout: Duration::from_secs(2),
        ..HttpTransportConfig::default()
    }
}

#[tokio::test]
async fn test_request_over_http_mesh() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let origin = listener.local_addr().unwrap();
    let app = Router::new().route("/v1/keys", get(|| async { r#"{"keysets":[]}"# }));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // The gateway doubles as the seed peer
    let gateway_node = HttpTransport::bind(transport_config(vec![]), LocalIdentity::generate())
        .await
        .unwrap();
    let seed = gateway_node.public_url().to_string();
    let gateway_address = gateway_node.local_address();
    let gateway_node: Arc<dyn MeshTransport> = Arc::new(gateway_node);
    let _gateway = ServerGateway::start(
        MeshContext::new(gateway_node),
        GatewayOptions::new(format!("http://{}/", origin)),
    )
    .unwrap();

    let client_node = HttpTransport::bind(transport_config(vec![seed]), LocalIdentity::generate())
        .await
        .unwrap();
    client_node.announce();
    let client = ClientProxy::new(
        MeshContext::new(Arc::new(client_node)),
        MappingTable::new().with("https://mint.example/", gateway_address),
        ProxyOptions {
            resolve_timeout: Duration::from_secs(10),
            ..ProxyOptions::default()
        },
    )
    .unwrap();

    let response = client
        .get("https://mint.example/v1/keys")
        .timeout(Duration::from_secs(10))
        .send()
        .await
        .unwrap();
    assert_eq!(response.text(), r#"{"keysets":[]}"#);
    assert_eq!(client.pending_requests().await.unwrap(), 0);
}
