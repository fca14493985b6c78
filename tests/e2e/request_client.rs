//! Request client against a local HTTP server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use super::harness::{test_config, CannedResponse, MockHttpServer, TEST_API_KEY};
use qrng_client::{
    EntropyData, Error, GenerateRequest, OutputFormat, QrngClient, QuantumMethod, SignatureType,
};
use serde_json::json;
use std::time::Duration;
use tokio::net::TcpListener;

fn success_body() -> serde_json::Value {
    json!({
        "data": "ab".repeat(16),
        "proofId": "p1",
        "signature": "sig",
        "publicKey": "pub",
        "signatureType": "ed25519",
        "metadata": {}
    })
}

#[tokio::test]
async fn test_generate_round_trip() {
    let server = MockHttpServer::start().await;
    server.enqueue(CannedResponse::json(200, &success_body()));

    let client = QrngClient::new(test_config(server.addr())).unwrap();
    let result = client
        .generate(&GenerateRequest::new(32, OutputFormat::Hex))
        .await
        .unwrap();

    assert_eq!(result.data, EntropyData::Text("ab".repeat(16)));
    assert_eq!(result.proof_id, "p1");
    assert_eq!(result.data.to_bytes(OutputFormat::Hex).unwrap(), vec![0xab; 16]);

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].target, "/api/random?bytes=32&format=hex");
    assert_eq!(
        requests[0].headers.get("x-api-key").map(String::as_str),
        Some(TEST_API_KEY)
    );
}

#[tokio::test]
async fn test_generate_optional_parameters() {
    let server = MockHttpServer::start().await;
    server.enqueue(CannedResponse::json(200, &success_body()));

    let client = QrngClient::new(test_config(server.addr())).unwrap();
    let request = GenerateRequest::new(8, OutputFormat::Uint8)
        .with_method(QuantumMethod::Tunneling)
        .with_signature_type(SignatureType::Dilithium5);
    client.generate(&request).await.unwrap();

    assert_eq!(
        server.requests()[0].target,
        "/api/random?bytes=8&format=uint8&method=tunneling&signatureType=dilithium5"
    );
}

#[tokio::test]
async fn test_status_mapping_over_http() {
    let server = MockHttpServer::start().await;
    server
        .enqueue(CannedResponse::json(401, &json!({"error": "Invalid API key"})))
        .enqueue(CannedResponse::json(429, &json!({"error": "Too many requests"})))
        .enqueue(CannedResponse::json(402, &json!({"error": "Monthly quota exceeded"})))
        .enqueue(CannedResponse::json(
            429,
            &json!({"error": "Quota exhausted", "code": "QUOTA_EXCEEDED"}),
        ))
        .enqueue(CannedResponse::text(502, "bad gateway"));

    let client = QrngClient::new(test_config(server.addr())).unwrap();
    let request = GenerateRequest::default();

    assert!(matches!(
        client.generate(&request).await,
        Err(Error::Authentication(_))
    ));
    assert!(matches!(
        client.generate(&request).await,
        Err(Error::RateLimit(_))
    ));
    assert!(matches!(
        client.generate(&request).await,
        Err(Error::QuotaExceeded(_))
    ));
    assert!(matches!(
        client.generate(&request).await,
        Err(Error::QuotaExceeded(_))
    ));
    match client.generate(&request).await {
        Err(Error::Service { status, message, .. }) => {
            assert_eq!(status, 502);
            assert_eq!(message, "HTTP 502");
        }
        other => panic!("expected service error, got {other:?}"),
    }

    // One request per call, no retries
    assert_eq!(server.requests().len(), 5);
}

#[tokio::test]
async fn test_forbidden_with_quota_marker_over_http() {
    let server = MockHttpServer::start().await;
    server.enqueue(CannedResponse::json(
        403,
        &json!({"error": "Monthly quota exhausted", "code": "QUOTA_EXCEEDED"}),
    ));

    let client = QrngClient::new(test_config(server.addr())).unwrap();
    match client.generate(&GenerateRequest::default()).await {
        Err(Error::QuotaExceeded(msg)) => assert_eq!(msg, "Monthly quota exhausted"),
        other => panic!("expected quota error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_validation_before_network() {
    let server = MockHttpServer::start().await;
    let client = QrngClient::new(test_config(server.addr())).unwrap();

    let result = client
        .generate(&GenerateRequest::new(2048, OutputFormat::Hex))
        .await;
    assert!(matches!(result, Err(Error::Validation(_))));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_health_over_http() {
    let server = MockHttpServer::start().await;
    server.enqueue(CannedResponse::json(
        200,
        &json!({
            "status": "healthy",
            "metrics": {
                "frequency": {"passed": true},
                "runs": {"passed": true},
                "longestRun": {"passed": false}
            },
            "timestamp": "2026-10-01T12:00:00Z"
        }),
    ));

    let client = QrngClient::new(test_config(server.addr())).unwrap();
    let health = client.health().await.unwrap();

    assert!(health.is_healthy());
    assert_eq!(health.metrics.len(), 3);
    assert!(health.timestamp_utc().is_some());
    assert_eq!(server.requests()[0].target, "/api/health");
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = QrngClient::new(test_config(addr)).unwrap();
    let result = client.health().await;
    assert!(matches!(result, Err(Error::Transport(_))), "{result:?}");
}

#[tokio::test]
async fn test_timeout_is_transport_error() {
    // Accepts connections but never answers
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _hold = tokio::spawn(async move {
        let mut sockets = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            sockets.push(socket);
        }
    });

    let config = test_config(addr).with_timeout(Duration::from_millis(200));
    let client = QrngClient::new(config).unwrap();

    let started = std::time::Instant::now();
    let result = client.generate(&GenerateRequest::default()).await;
    assert!(matches!(result, Err(Error::Transport(_))), "{result:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_close_then_reuse_config() {
    let server = MockHttpServer::start().await;
    server
        .enqueue(CannedResponse::json(200, &success_body()))
        .enqueue(CannedResponse::json(200, &success_body()));

    let config = test_config(server.addr());
    {
        let client = QrngClient::new(config.clone()).unwrap();
        client.generate(&GenerateRequest::default()).await.unwrap();
        client.close();
    }

    // A fresh client from the same config works independently
    let client = QrngClient::new(config).unwrap();
    client.generate(&GenerateRequest::default()).await.unwrap();
    assert_eq!(server.requests().len(), 2);
}
