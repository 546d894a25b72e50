//! Integration tests for the HTTP gateway routes, exercised over a real
//! socket on an ephemeral port.

use std::sync::Arc;

use serde_json::json;

use courier_gateway::client::ClientEvent;
use courier_gateway::http::router;
use courier_gateway::session::SessionManager;

use super::test_helpers::{test_manager, MockClient};

/// Serve the gateway router on an ephemeral port, returning the base URL.
async fn spawn_gateway(manager: Arc<SessionManager>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        let _ = axum::serve(listener, router(manager)).await;
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn root_and_health_respond() {
    let client = MockClient::new();
    let base = spawn_gateway(test_manager(&client)).await;

    let resp = reqwest::get(format!("{base}/")).await.expect("request");
    assert_eq!(resp.status(), 200);
    assert!(resp.text().await.expect("body").contains("courier-gateway"));

    let resp = reqwest::get(format!("{base}/health")).await.expect("request");
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.expect("body"), "ok");
}

#[tokio::test]
async fn status_reflects_the_session_phase() {
    let client = MockClient::new();
    let manager = test_manager(&client);
    let base = spawn_gateway(Arc::clone(&manager)).await;

    let body: serde_json::Value = reqwest::get(format!("{base}/status"))
        .await
        .expect("request")
        .json()
        .await
        .expect("json body");
    assert_eq!(body["ready"], false);
    assert_eq!(body["pairing_available"], false);
    assert_eq!(body["phase"], "initializing");

    manager.handle_event(ClientEvent::Ready).await;

    let body: serde_json::Value = reqwest::get(format!("{base}/status"))
        .await
        .expect("request")
        .json()
        .await
        .expect("json body");
    assert_eq!(body["ready"], true);
    assert_eq!(body["phase"], "ready");
}

#[tokio::test]
async fn qr_walks_through_waiting_ready_and_connected() {
    let client = MockClient::new();
    let manager = test_manager(&client);
    let base = spawn_gateway(Arc::clone(&manager)).await;

    let body: serde_json::Value = reqwest::get(format!("{base}/qr"))
        .await
        .expect("request")
        .json()
        .await
        .expect("json body");
    assert_eq!(body["status"], "waiting");

    manager
        .handle_event(ClientEvent::PairingCode {
            code: "ABC123".to_owned(),
        })
        .await;

    let body: serde_json::Value = reqwest::get(format!("{base}/qr"))
        .await
        .expect("request")
        .json()
        .await
        .expect("json body");
    assert_eq!(body["status"], "qr_ready");
    assert_eq!(body["qr_code"], "ABC123");
    assert!(body["qr_image"]
        .as_str()
        .expect("image present")
        .starts_with("data:image/svg+xml;base64,"));

    manager.handle_event(ClientEvent::Ready).await;

    let body: serde_json::Value = reqwest::get(format!("{base}/qr"))
        .await
        .expect("request")
        .json()
        .await
        .expect("json body");
    assert_eq!(body["status"], "connected");
}

#[tokio::test]
async fn send_rejects_missing_fields_with_400() {
    let client = MockClient::new();
    let base = spawn_gateway(test_manager(&client)).await;
    let http = reqwest::Client::new();

    for body in [
        json!({}),
        json!({ "number": "15551234567" }),
        json!({ "message": "hi" }),
        json!({ "number": "", "message": "hi" }),
    ] {
        let resp = http
            .post(format!("{base}/send"))
            .json(&body)
            .send()
            .await
            .expect("request");
        assert_eq!(resp.status(), 400, "body {body} must be rejected");

        let payload: serde_json::Value = resp.json().await.expect("json body");
        assert_eq!(payload["error"], "number and message are required");
    }

    assert!(client.deliveries().is_empty());
}

#[tokio::test]
async fn send_while_ready_returns_success_payload() {
    let client = MockClient::new();
    let manager = test_manager(&client);
    let base = spawn_gateway(Arc::clone(&manager)).await;
    manager.handle_event(ClientEvent::Ready).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/send"))
        .json(&json!({ "number": "15551234567", "message": "hi" }))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 200);

    let payload: serde_json::Value = resp.json().await.expect("json body");
    assert_eq!(payload["success"], true);
    assert_eq!(payload["response"]["id"], "MSG-1");
    assert_eq!(
        client.deliveries(),
        vec![("15551234567@c.us".to_owned(), "hi".to_owned())]
    );
}

#[tokio::test]
async fn send_while_not_ready_returns_500_with_message() {
    let client = MockClient::new();
    let base = spawn_gateway(test_manager(&client)).await;

    // The 1-second test send timeout runs out with no readiness event.
    let resp = reqwest::Client::new()
        .post(format!("{base}/send"))
        .json(&json!({ "number": "15551234567", "message": "hi" }))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 500);

    let payload: serde_json::Value = resp.json().await.expect("json body");
    let error = payload["error"].as_str().expect("error message");
    assert!(error.contains("timed out"), "unexpected error: {error}");
}
