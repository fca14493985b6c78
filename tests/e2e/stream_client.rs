//! Stream client against a local WebSocket server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use super::harness::{eventually, test_config, Event, MockStreamServer, Recorder, TEST_API_KEY};
use qrng_client::{Callbacks, Error, OutputFormat, QrngStreamClient};
use serde_json::json;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn test_three_chunks_in_order() {
    let server = MockStreamServer::start().await;
    let recorder = Recorder::default();

    let client = QrngStreamClient::new(test_config(server.addr())).unwrap();
    let session = client
        .connect(recorder.clone(), 32, OutputFormat::Hex)
        .await
        .unwrap();
    assert!(session.is_live());
    assert_eq!(session.chunk_size(), 32);
    assert_eq!(session.format(), OutputFormat::Hex);

    let payloads = ["11".repeat(32), "22".repeat(32), "33".repeat(32)];
    for payload in &payloads {
        server.send_data(json!(payload));
    }
    recorder.wait_for(3).await;

    let received: Vec<String> = recorder
        .events()
        .into_iter()
        .map(|e| match e {
            Event::Data(chunk) => {
                assert_eq!(chunk.to_bytes().unwrap().len(), 32);
                chunk.data.as_text().unwrap().to_string()
            }
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(received, payloads);
    assert_eq!(session.chunks_delivered(), 3);

    session.disconnect().await.unwrap();
    assert_eq!(recorder.count(|e| *e == Event::Close), 1);
    assert!(eventually(|| server.client_closed()).await);
}

#[tokio::test]
async fn test_negotiation_and_upgrade() {
    let server = MockStreamServer::start().await;
    let client = QrngStreamClient::new(test_config(server.addr())).unwrap();
    let session = client
        .connect(Recorder::default(), 64, OutputFormat::Base64)
        .await
        .unwrap();

    assert!(eventually(|| server.negotiation().is_some()).await);
    assert_eq!(
        server.negotiation().unwrap(),
        json!({"apiKey": TEST_API_KEY, "chunkSize": 64, "format": "base64"})
    );

    let upgrade = server.upgrade().unwrap();
    assert_eq!(upgrade.uri, "/api/stream?chunkSize=64&format=base64");
    assert_eq!(upgrade.api_key.as_deref(), Some(TEST_API_KEY));

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_twice() {
    let server = MockStreamServer::start().await;
    let recorder = Recorder::default();
    let client = QrngStreamClient::new(test_config(server.addr())).unwrap();
    let session = client
        .connect(recorder.clone(), 16, OutputFormat::Hex)
        .await
        .unwrap();

    session.disconnect().await.unwrap();
    session.disconnect().await.unwrap();

    assert!(!session.is_live());
    assert_eq!(recorder.events(), vec![Event::Close]);
}

#[tokio::test]
async fn test_no_callbacks_after_disconnect() {
    let server = MockStreamServer::start().await;
    let recorder = Recorder::default();
    let client = QrngStreamClient::new(test_config(server.addr())).unwrap();
    let session = client
        .connect(recorder.clone(), 4, OutputFormat::Hex)
        .await
        .unwrap();

    server.send_data(json!("deadbeef"));
    recorder.wait_for(1).await;
    session.disconnect().await.unwrap();
    let settled = recorder.events();

    server.send_data(json!("cafebabe"));
    server.send(Message::text(json!({"error": "late"}).to_string()));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(recorder.events(), settled);
}

#[tokio::test]
async fn test_service_error_frame() {
    let server = MockStreamServer::start().await;
    let recorder = Recorder::default();
    let client = QrngStreamClient::new(test_config(server.addr())).unwrap();
    let session = client
        .connect(recorder.clone(), 32, OutputFormat::Hex)
        .await
        .unwrap();

    server.send(Message::text(
        json!({"error": "Monthly quota exceeded", "code": "QUOTA_EXCEEDED"}).to_string(),
    ));
    recorder.wait_for(2).await;

    let events = recorder.events();
    assert!(matches!(&events[0], Event::Error(msg) if msg.starts_with("quota exceeded")));
    assert_eq!(events[1], Event::Close);
    assert!(!session.is_live());
}

#[tokio::test]
async fn test_server_close() {
    let server = MockStreamServer::start().await;
    let recorder = Recorder::default();
    let client = QrngStreamClient::new(test_config(server.addr())).unwrap();
    let _session = client
        .connect(recorder.clone(), 32, OutputFormat::Hex)
        .await
        .unwrap();

    server.send(Message::Close(None));
    recorder.wait_for(1).await;
    assert_eq!(recorder.events(), vec![Event::Close]);
}

#[tokio::test]
async fn test_closure_callbacks() {
    let server = MockStreamServer::start().await;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let close_tx = tx.clone();

    let callbacks = Callbacks::new(move |chunk| {
        let _ = tx.send(Some(chunk));
    })
    .with_close(move || {
        let _ = close_tx.send(None);
    });

    let client = QrngStreamClient::new(test_config(server.addr())).unwrap();
    let session = client
        .connect(callbacks, 2, OutputFormat::Uint8)
        .await
        .unwrap();

    server.send_data(json!([7, 9]));
    let chunk = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .flatten()
        .unwrap();
    assert_eq!(chunk.to_bytes().unwrap(), vec![7, 9]);

    session.disconnect().await.unwrap();
    assert!(matches!(rx.recv().await, Some(None)));
}

#[tokio::test]
async fn test_rejected_upgrade() {
    let server = MockStreamServer::rejecting(401).await;
    let client = QrngStreamClient::new(test_config(server.addr())).unwrap();

    let result = client.connect(Recorder::default(), 32, OutputFormat::Hex).await;
    assert!(matches!(result, Err(Error::Authentication(_))));
}

#[tokio::test]
async fn test_rate_limited_upgrade() {
    let server = MockStreamServer::rejecting(429).await;
    let client = QrngStreamClient::new(test_config(server.addr())).unwrap();

    let result = client.connect(Recorder::default(), 32, OutputFormat::Hex).await;
    assert!(matches!(result, Err(Error::RateLimit(_))));
}

#[tokio::test]
async fn test_forbidden_upgrade_with_quota_marker() {
    let server = MockStreamServer::rejecting_with(
        403,
        &json!({"error": "Monthly quota exhausted", "code": "QUOTA_EXCEEDED"}),
    )
    .await;
    let client = QrngStreamClient::new(test_config(server.addr())).unwrap();

    let result = client.connect(Recorder::default(), 32, OutputFormat::Hex).await;
    assert!(matches!(result, Err(Error::QuotaExceeded(_))), "{result:?}");
}

#[tokio::test]
async fn test_invalid_chunk_size() {
    let server = MockStreamServer::start().await;
    let client = QrngStreamClient::new(test_config(server.addr())).unwrap();

    for size in [0, 1025] {
        let result = client.connect(Recorder::default(), size, OutputFormat::Hex).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }
    assert!(server.upgrade().is_none());
}

#[tokio::test]
async fn test_handshake_timeout() {
    // Accepts TCP but never completes the upgrade
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _hold = tokio::spawn(async move {
        let mut sockets = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            sockets.push(socket);
        }
    });

    let config = test_config(addr).with_timeout(Duration::from_millis(200));
    let client = QrngStreamClient::new(config).unwrap();

    let result = client.connect(Recorder::default(), 32, OutputFormat::Hex).await;
    assert!(matches!(result, Err(Error::Transport(_))));
}
