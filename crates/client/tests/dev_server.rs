//! End-to-end run against the dev notification server.

use std::time::Duration;

use kycwatch_client::realtime::KycFetcher;
use kycwatch_client::{ApiClient, EventType, InboundMessage, RealtimeClient, RealtimeConfig};
use kycwatch_server::AppState;
use kycwatch_shared::ApiError;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(5);

/// Publish until a socket receives it; the server subscribes a socket only after
/// the handshake completes.
async fn publish_to_socket(api: &ApiClient, key: &str, message: &InboundMessage) {
    for _ in 0..100 {
        let body: Value = api
            .post_json(&format!("/api/investors/{key}/events"), message)
            .await
            .expect("publish failed");
        if body["delivered"].as_u64().unwrap_or(0) > 0 {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("no socket subscribed to {key}");
}

#[tokio::test]
async fn events_flow_from_server_to_listeners() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(kycwatch_server::serve(listener, AppState::new()));

    let config = RealtimeConfig::default()
        .with_ws_base(format!("ws://{addr}"))
        .with_api_base(format!("http://{addr}"));
    let api = ApiClient::from_config(&config);
    let client = RealtimeClient::from_config(config);

    let (tx, mut verified) = mpsc::unbounded_channel();
    let _guard = client.on_document_verified(move |data| {
        let _ = tx.send(data.clone());
    });
    let mut watch = client.watch("inv-1");

    let mut states = client.state_changes();
    timeout(WAIT, states.wait_for(|s| s.is_connected()))
        .await
        .expect("never connected")
        .unwrap();

    let doc = InboundMessage::new(EventType::DocumentVerified, json!({"id": "doc1"}));
    publish_to_socket(&api, "inv-1", &doc).await;
    let received = timeout(WAIT, verified.recv()).await.unwrap();
    assert_eq!(received, Some(json!({"id": "doc1"})));

    let status = json!({"investor_id": "inv-1", "level": "approved"});
    publish_to_socket(&api, "inv-1", &InboundMessage::kyc_update(status.clone())).await;
    timeout(WAIT, async {
        while watch.latest_data().as_ref() != Some(&status) {
            watch.changed().await;
        }
    })
    .await
    .expect("kyc_update never reached the watch");

    // The polling endpoint serves the same state.
    assert_eq!(api.fetch_kyc("inv-1").await.unwrap(), status);

    client.cleanup();
}

#[tokio::test]
async fn unknown_keys_are_not_found() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(kycwatch_server::serve(listener, AppState::new()));

    let api = ApiClient::new().with_base_url(format!("http://{addr}"));
    match api.fetch_kyc("nobody").await {
        Err(ApiError::Http { status, body }) => {
            assert_eq!(status, 404);
            assert!(body.contains("no KYC state for nobody"));
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let err = api
        .post_json::<_, Value>("/api/investors/x/events", &json!({"type": "nonsense"}))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Http { status: 400, .. }));
}
