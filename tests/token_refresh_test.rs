//! Integration tests for single-flight credential renewal.
//!
//! Runs the coordinator against a wiremock server through the real reqwest
//! adapter.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{api_config, fresh_token};
use mailpilot::adapters::ReqwestHttpClient;
use mailpilot::{ApiError, ApiRequest, AuthError, Credential, SessionContext, TokenRefreshCoordinator};

struct Fixture {
    server: MockServer,
    coordinator: TokenRefreshCoordinator,
    old_token: String,
    new_token: String,
}

impl Fixture {
    async fn start() -> Self {
        let server = MockServer::start().await;
        let old_token = fresh_token("test-user");
        let new_token = fresh_token("test-user-renewed");
        let session = SessionContext::authenticated(Credential::new(old_token.clone()));
        let coordinator = TokenRefreshCoordinator::new(
            Arc::new(ReqwestHttpClient::new()),
            session,
            &api_config(&server.uri()),
        );
        Self {
            server,
            coordinator,
            old_token,
            new_token,
        }
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {}", token)
    }

    /// `GET route` succeeds only with the renewed credential.
    async fn accept_new_token_only(&self, route: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .and(header("authorization", Self::bearer(&self.new_token).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "route": route })))
            .with_priority(1)
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "expired" })))
            .mount(&self.server)
            .await;
    }

    async fn refresh_succeeds(&self, delay: Duration, times: u64) {
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .and(header("authorization", Self::bearer(&self.old_token).as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "access_token": self.new_token,
                        "token_type": "bearer",
                    }))
                    .set_delay(delay),
            )
            .expect(times)
            .mount(&self.server)
            .await;
    }

    async fn refresh_rejected(&self, times: u64) {
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(401).set_body_string("refresh token expired"))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    async fn requests_to(&self, route: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == route)
            .count()
    }
}

#[tokio::test]
async fn test_concurrent_401s_share_one_renewal() {
    let fx = Fixture::start().await;
    fx.accept_new_token_only("/emails").await;
    fx.accept_new_token_only("/stats").await;
    fx.accept_new_token_only("/settings").await;
    fx.refresh_succeeds(Duration::from_millis(200), 1).await;

    let (emails, stats, settings) = tokio::join!(
        fx.coordinator.issue(ApiRequest::get("/emails")),
        fx.coordinator.issue(ApiRequest::get("/stats")),
        fx.coordinator.issue(ApiRequest::get("/settings")),
    );

    for (route, result) in [("/emails", emails), ("/stats", stats), ("/settings", settings)] {
        let body: Value = result.expect("request recovered").json().unwrap();
        assert_eq!(body["route"], route);
    }

    assert_eq!(
        fx.coordinator.session().access_token().as_deref(),
        Some(fx.new_token.as_str())
    );
    assert!(!fx.coordinator.is_renewing().await);
}

#[tokio::test]
async fn test_renewed_credential_used_for_later_requests() {
    let fx = Fixture::start().await;
    fx.accept_new_token_only("/emails").await;
    fx.refresh_succeeds(Duration::ZERO, 1).await;

    fx.coordinator.issue(ApiRequest::get("/emails")).await.unwrap();
    fx.coordinator.issue(ApiRequest::get("/emails")).await.unwrap();

    // first call: 401 + replay, second call: straight through
    assert_eq!(fx.requests_to("/emails").await, 3);
}

#[tokio::test]
async fn test_renewal_failure_fails_every_waiter_and_logs_out() {
    let fx = Fixture::start().await;
    fx.accept_new_token_only("/emails").await;
    fx.accept_new_token_only("/stats").await;
    fx.refresh_rejected(1).await;

    let (emails, stats) = tokio::join!(
        fx.coordinator.issue(ApiRequest::get("/emails")),
        fx.coordinator.issue(ApiRequest::get("/stats")),
    );

    for result in [emails, stats] {
        match result {
            Err(ApiError::SessionExpired(AuthError::Rejected { status, .. })) => {
                assert_eq!(status, 401)
            }
            other => panic!("expected SessionExpired, got {:?}", other),
        }
    }

    let session = fx.coordinator.session();
    assert!(!session.is_authenticated());
    assert!(session.access_token().is_none());
}

#[tokio::test]
async fn test_second_401_after_renewal_is_final() {
    let fx = Fixture::start().await;
    Mock::given(method("GET"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&fx.server)
        .await;
    fx.refresh_succeeds(Duration::ZERO, 1).await;

    let result = fx.coordinator.issue(ApiRequest::get("/emails")).await;

    assert_eq!(result.unwrap_err(), ApiError::Unauthorized);
    assert_eq!(fx.requests_to("/emails").await, 2);
    // renewal itself succeeded, so the session stays
    assert!(fx.coordinator.session().is_authenticated());
}

#[tokio::test]
async fn test_auth_endpoint_401_is_returned_untouched() {
    let fx = Fixture::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad password"))
        .mount(&fx.server)
        .await;
    fx.refresh_rejected(0).await;

    let request = ApiRequest::post("/auth/login", &json!({ "email": "a@b.c", "password": "x" }));
    let result = fx.coordinator.issue(request).await;

    assert_eq!(
        result.unwrap_err(),
        ApiError::Status {
            status: 401,
            body: "bad password".to_string()
        }
    );
    assert!(fx.coordinator.session().is_authenticated());
}

#[tokio::test]
async fn test_other_errors_skip_renewal() {
    let fx = Fixture::start().await;
    Mock::given(method("GET"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&fx.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&fx.server)
        .await;
    fx.refresh_rejected(0).await;

    let err = fx.coordinator.issue(ApiRequest::get("/emails")).await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert!(!err.requires_reauth());

    let err = fx.coordinator.issue(ApiRequest::get("/admin")).await.unwrap_err();
    assert_eq!(err.status(), Some(403));
}

#[tokio::test]
async fn test_401_without_credential_does_not_renew() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let coordinator = TokenRefreshCoordinator::new(
        Arc::new(ReqwestHttpClient::new()),
        SessionContext::new(),
        &api_config(&server.uri()),
    );

    let result = coordinator.issue(ApiRequest::get("/emails")).await;
    assert_eq!(result.unwrap_err(), ApiError::NotAuthenticated);

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_replay_keeps_method_and_body() {
    let fx = Fixture::start().await;
    Mock::given(method("POST"))
        .and(path("/emails/42/reply"))
        .and(header("authorization", Fixture::bearer(&fx.new_token).as_str()))
        .respond_with(ResponseTemplate::new(201))
        .with_priority(1)
        .mount(&fx.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/emails/42/reply"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&fx.server)
        .await;
    fx.refresh_succeeds(Duration::ZERO, 1).await;

    let body = json!({ "text": "Thanks, see you Monday" });
    let response = fx
        .coordinator
        .issue(ApiRequest::post("/emails/42/reply", &body))
        .await
        .unwrap();
    assert_eq!(response.status, 201);

    let requests = fx.server.received_requests().await.unwrap();
    let replies: Vec<_> = requests
        .iter()
        .filter(|r| r.url.path() == "/emails/42/reply")
        .collect();
    assert_eq!(replies.len(), 2);
    for request in replies {
        let sent: Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(sent, body);
    }
}

#[tokio::test]
async fn test_transport_error_is_not_an_auth_failure() {
    // nothing listens on port 9
    let config = api_config("http://127.0.0.1:9");
    let session = SessionContext::authenticated(Credential::new(fresh_token("test-user")));
    let coordinator =
        TokenRefreshCoordinator::new(Arc::new(ReqwestHttpClient::new()), session, &config);

    let err = coordinator.issue(ApiRequest::get("/emails")).await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)));
    assert!(coordinator.session().is_authenticated());
}

#[tokio::test]
async fn test_renewal_issuing_expired_credential_logs_out() {
    let fx = Fixture::start().await;
    let expired = common::expired_token("test-user-renewed");
    Mock::given(method("GET"))
        .and(path("/emails"))
        .and(header("authorization", Fixture::bearer(&expired).as_str()))
        .respond_with(ResponseTemplate::new(200))
        .with_priority(1)
        .expect(0)
        .mount(&fx.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&fx.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": expired }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&fx.server)
        .await;

    let (first, second) = tokio::join!(
        fx.coordinator.issue(ApiRequest::get("/emails")),
        fx.coordinator.issue(ApiRequest::get("/emails")),
    );

    for result in [first, second] {
        assert_eq!(
            result.unwrap_err(),
            ApiError::SessionExpired(AuthError::ExpiredCredential)
        );
    }
    assert!(!fx.coordinator.session().is_authenticated());
    assert_eq!(fx.requests_to("/emails").await, 2);
}
