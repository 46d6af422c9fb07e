//! Common test utilities for integration tests.
//!
//! Token fixtures, config builders and a status waiter shared by the
//! coordinator, live channel and persistence tests.

#![allow(dead_code)]

pub mod ws_server;

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use tokio::sync::watch;

use mailpilot::live::{ConnectionStatus, ReconnectPolicy};
use mailpilot::{ClientConfig, Credential, SessionContext};

/// Build an unsigned JWT expiring `exp_offset_secs` from now.
pub fn make_jwt(exp_offset_secs: i64, sub: &str) -> String {
    let exp = chrono::Utc::now().timestamp() + exp_offset_secs;
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{},"sub":"{}"}}"#, exp, sub));
    let signature = URL_SAFE_NO_PAD.encode("fake-signature");
    format!("{}.{}.{}", header, payload, signature)
}

/// A token valid for an hour.
pub fn fresh_token(sub: &str) -> String {
    make_jwt(3600, sub)
}

/// A token that expired a minute ago.
pub fn expired_token(sub: &str) -> String {
    make_jwt(-60, sub)
}

/// A session holding a fresh credential for `test-user`.
pub fn authenticated_session() -> SessionContext {
    SessionContext::authenticated(Credential::new(fresh_token("test-user")))
}

/// Config pointing the API at `api_base` with the default reconnect policy.
pub fn api_config(api_base: &str) -> ClientConfig {
    ClientConfig::default().with_api_base_url(api_base)
}

/// Config for live channel tests: 1s base, 30s cap, ±20% jitter.
pub fn live_config(ws_url: &str) -> ClientConfig {
    ClientConfig::default()
        .with_ws_url(ws_url)
        .with_reconnect(ReconnectPolicy::new(
            Duration::from_millis(1000),
            Duration::from_millis(30_000),
        ))
}

/// Wait until `status` satisfies `pred`, or panic after a minute.
pub async fn wait_for_status<F>(
    status: &mut watch::Receiver<ConnectionStatus>,
    pred: F,
) -> ConnectionStatus
where
    F: Fn(&ConnectionStatus) -> bool,
{
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            let current = *status.borrow_and_update();
            if pred(&current) {
                return current;
            }
            status.changed().await.expect("status channel closed");
        }
    })
    .await
    .expect("timed out waiting for connection status")
}
