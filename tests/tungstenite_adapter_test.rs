//! End-to-end tests of the live channel over a real local WebSocket server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use common::ws_server::spawn_ws_server;
use common::{authenticated_session, live_config, wait_for_status};
use mailpilot::adapters::TungsteniteConnector;
use mailpilot::live::ReconnectPolicy;
use mailpilot::{ConnectionManager, Phase};

const STEP: Duration = Duration::from_secs(5);

fn fast_reconnect(ws_url: &str) -> mailpilot::ClientConfig {
    live_config(ws_url).with_reconnect(ReconnectPolicy::new(
        Duration::from_millis(50),
        Duration::from_millis(200),
    ))
}

#[tokio::test]
async fn test_live_session_over_websocket() {
    let (url, mut conns) = spawn_ws_server().await;
    let session = authenticated_session();
    let token = session.access_token().unwrap();
    let manager = ConnectionManager::spawn(
        &fast_reconnect(&url),
        Arc::new(TungsteniteConnector::new()),
        session,
    );
    let mut events = manager.subscribe();

    let mut conn = timeout(STEP, conns.recv()).await.unwrap().unwrap();
    let auth = timeout(STEP, conn.recv_json()).await.unwrap().unwrap();
    assert_eq!(auth, json!({ "token": token }));

    conn.send_json(&json!({ "type": "connected", "user_id": "test-user" }))
        .await;
    wait_for_status(&mut manager.watch_status(), |s| s.is_connected).await;

    conn.send_json(&json!({ "type": "email_classified", "email_id": 9, "category": "urgent" }))
        .await;
    let event = timeout(STEP, events.recv()).await.unwrap().unwrap();
    assert_eq!(event.kind(), Some("email_classified"));
    assert_eq!(event.as_json().unwrap()["category"], "urgent");

    conn.send_json(&json!({ "type": "ping" })).await;
    let pong = timeout(STEP, conn.recv_json()).await.unwrap().unwrap();
    assert_eq!(pong, json!({ "type": "pong" }));

    assert!(manager.send(&json!({ "type": "subscribe", "folder": "inbox" })).await);
    let sent = timeout(STEP, conn.recv_json()).await.unwrap().unwrap();
    assert_eq!(sent, json!({ "type": "subscribe", "folder": "inbox" }));

    manager.disconnect();
    // the client's close frame ends the server read
    assert!(timeout(STEP, conn.recv_json()).await.unwrap().is_none());
    wait_for_status(&mut manager.watch_status(), |s| s.phase == Phase::ClosedIntentional).await;
}

#[tokio::test]
async fn test_server_close_triggers_reconnect() {
    let (url, mut conns) = spawn_ws_server().await;
    let manager = ConnectionManager::spawn(
        &fast_reconnect(&url),
        Arc::new(TungsteniteConnector::new()),
        authenticated_session(),
    );

    let mut conn = timeout(STEP, conns.recv()).await.unwrap().unwrap();
    timeout(STEP, conn.recv_json()).await.unwrap().unwrap();
    conn.send_json(&json!({ "type": "connected" })).await;
    wait_for_status(&mut manager.watch_status(), |s| s.is_connected).await;

    conn.close().await;

    let mut second = timeout(STEP, conns.recv()).await.unwrap().unwrap();
    let auth = timeout(STEP, second.recv_json()).await.unwrap().unwrap();
    assert!(auth.get("token").is_some());
    second.send_json(&json!({ "type": "connected" })).await;

    let status = wait_for_status(&mut manager.watch_status(), |s| s.is_connected).await;
    assert_eq!(status.reconnect_attempts, 0);
}

#[tokio::test]
async fn test_unreachable_server_keeps_retrying() {
    // bind then drop to get a port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let manager = ConnectionManager::spawn(
        &fast_reconnect(&format!("ws://127.0.0.1:{}/ws", port)),
        Arc::new(TungsteniteConnector::new()),
        authenticated_session(),
    );

    let status = wait_for_status(&mut manager.watch_status(), |s| s.reconnect_attempts >= 3).await;
    assert!(!status.is_connected);
    manager.shutdown().await;
}
