//! Integration tests for the HTTP mesh transport

use meshproxy_transport::http::AnnounceRecord;
use meshproxy_transport::{
    DeliveryStatus, HttpTransport, HttpTransportConfig, MeshTransport, OutboundMessage,
};
use meshproxy_types::{Fields, LocalIdentity};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn config(seeds: Vec<String>) -> HttpTransportConfig {
    HttpTransportConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        seed_peers: seeds,
        max_attempts: 2,
        retry_backoff: Duration::from_millis(10),
        request_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_announce_reaches_seed() {
    let seed = HttpTransport::bind(config(vec![]), LocalIdentity::generate())
        .await
        .unwrap();
    let node = HttpTransport::bind(config(vec![seed.public_url().to_string()]), LocalIdentity::generate())
        .await
        .unwrap();

    node.announce();

    let node_address = node.local_address();
    assert!(wait_for(|| seed.recall_identity(&node_address).is_some()).await);
    assert_eq!(seed.recall_identity(&node_address), Some(node.local_identity()));
}

#[tokio::test]
async fn test_request_path_through_seed() {
    let seed = HttpTransport::bind(config(vec![]), LocalIdentity::generate())
        .await
        .unwrap();
    let seed_url = seed.public_url().to_string();
    let server = HttpTransport::bind(config(vec![seed_url.clone()]), LocalIdentity::generate())
        .await
        .unwrap();
    let client = HttpTransport::bind(config(vec![seed_url]), LocalIdentity::generate())
        .await
        .unwrap();

    server.announce();
    let server_address = server.local_address();
    assert!(wait_for(|| seed.recall_identity(&server_address).is_some()).await);

    assert!(client.recall_identity(&server_address).is_none());
    client.request_path(&server_address);
    assert!(wait_for(|| client.recall_identity(&server_address).is_some()).await);
}

#[tokio::test]
async fn test_send_message_delivers_signed_source() {
    let receiver = HttpTransport::bind(config(vec![]), LocalIdentity::generate())
        .await
        .unwrap();
    let sender = HttpTransport::bind(config(vec![]), LocalIdentity::generate())
        .await
        .unwrap();
    sender.add_peer(receiver.announce_record()).unwrap();

    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
    receiver.set_inbound_handler(Arc::new(move |msg| {
        let _ = inbound_tx.send(msg);
    }));

    let fields = Fields {
        req_id: Some("ab12".to_string()),
        ..Fields::default()
    };
    let (status_tx, mut status_rx) = mpsc::unbounded_channel();
    sender.send_message(
        OutboundMessage::new(receiver.local_identity(), "payload", fields),
        Box::new(move |status| {
            let _ = status_tx.send(status);
        }),
    );

    let msg = tokio::time::timeout(Duration::from_secs(5), inbound_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(msg.source, sender.local_address());
    assert_eq!(msg.content, "payload");
    assert_eq!(msg.fields.req_id.as_deref(), Some("ab12"));

    let status = tokio::time::timeout(Duration::from_secs(5), status_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, DeliveryStatus::Delivered);
}

#[tokio::test]
async fn test_send_without_path_fails() {
    let sender = HttpTransport::bind(config(vec![]), LocalIdentity::generate())
        .await
        .unwrap();
    let stranger = LocalIdentity::generate();

    let (status_tx, mut status_rx) = mpsc::unbounded_channel();
    sender.send_message(
        OutboundMessage::new(stranger.identity(), "payload", Fields::default()),
        Box::new(move |status| {
            let _ = status_tx.send(status);
        }),
    );

    let status = tokio::time::timeout(Duration::from_secs(5), status_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(status, DeliveryStatus::Failed { .. }));
}

#[tokio::test]
async fn test_send_to_unreachable_peer_fails_after_retries() {
    let sender = HttpTransport::bind(config(vec![]), LocalIdentity::generate())
        .await
        .unwrap();
    // A peer whose announced URL has nobody listening
    let ghost = LocalIdentity::generate();
    sender
        .add_peer(AnnounceRecord::new(&ghost, "http://127.0.0.1:1"))
        .unwrap();

    let (status_tx, mut status_rx) = mpsc::unbounded_channel();
    sender.send_message(
        OutboundMessage::new(ghost.identity(), "payload", Fields::default()),
        Box::new(move |status| {
            let _ = status_tx.send(status);
        }),
    );

    let status = tokio::time::timeout(Duration::from_secs(10), status_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(status, DeliveryStatus::Failed { .. }));
}
