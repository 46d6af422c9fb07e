//! Token refresh coordinator.
//!
//! Every application request goes through [`TokenRefreshCoordinator::issue`],
//! which attaches the session's bearer credential. When the server answers
//! 401, the request is parked in a FIFO queue and a single renewal call is
//! started; further 401s while that renewal is running join the same queue.
//! When renewal settles, every parked request is either replayed once with
//! the new credential (in arrival order) or failed with
//! [`ApiError::SessionExpired`].
//!
//! ```text
//!  issue ──▶ send ──2xx──▶ Ok
//!              │
//!             401 ──▶ credential changed since send? ──yes──▶ replay once
//!                          │ no
//!                          ▼
//!                    enqueue ──(first in)──▶ spawn renewal
//!                          │
//!            renewal ok ───┴─── renewal failed
//!                │                    │
//!          replay queue FIFO    fail queue, logout
//! ```
//!
//! Requests to the authentication endpoints bypass all of this and return
//! their 401 as [`ApiError::Status`].

mod request;

pub use request::ApiRequest;

use std::collections::VecDeque;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::auth::{AuthApi, Credential, SessionContext};
use crate::config::ClientConfig;
use crate::error::{ApiError, AuthError};
use crate::traits::{HttpClient, HttpRequest, Response};

type Reply = Result<Response, ApiError>;

struct Waiter {
    request: ApiRequest,
    reply: oneshot::Sender<Reply>,
}

#[derive(Default)]
struct RenewalState {
    in_flight: bool,
    queue: VecDeque<Waiter>,
}

/// Outcome of handing a rejected request to the renewal queue.
enum Admission {
    /// The session already holds a newer credential.
    Replay(ApiRequest, String),
    Queued(oneshot::Receiver<Reply>),
    NoCredential,
}

struct Inner {
    http: Arc<dyn HttpClient>,
    auth: AuthApi,
    session: SessionContext,
    base_url: String,
    renewal: Mutex<RenewalState>,
}

/// Issues API requests with single-flight credential renewal.
///
/// Cheap to clone; clones share the renewal queue.
#[derive(Clone)]
pub struct TokenRefreshCoordinator {
    inner: Arc<Inner>,
}

impl TokenRefreshCoordinator {
    pub fn new(http: Arc<dyn HttpClient>, session: SessionContext, config: &ClientConfig) -> Self {
        let auth = AuthApi::new(http.clone(), session.clone(), config);
        Self {
            inner: Arc::new(Inner {
                http,
                auth,
                session,
                base_url: config.api_base_url.trim_end_matches('/').to_string(),
                renewal: Mutex::new(RenewalState::default()),
            }),
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.inner.session
    }

    /// The authentication API sharing this coordinator's client and session.
    pub fn auth(&self) -> &AuthApi {
        &self.inner.auth
    }

    /// Whether a renewal call is currently running.
    pub async fn is_renewing(&self) -> bool {
        self.inner.renewal.lock().await.in_flight
    }

    /// Send `request` with the current credential.
    ///
    /// Returns the response for any 2xx status. A 401 is recovered from at
    /// most once via renewal; everything else is returned as an error
    /// untouched.
    pub async fn issue(&self, request: ApiRequest) -> Result<Response, ApiError> {
        let sent_with = self.inner.session.access_token();
        let response = self.inner.send(&request, sent_with.as_deref()).await?;

        if !response.is_unauthorized() || self.inner.auth.is_auth_path(&request.path) {
            return finish(response);
        }

        debug!(request_id = %request.id(), path = %request.path, "request unauthorized");
        match self.inner.admit(request, sent_with).await {
            Admission::Replay(request, token) => self.inner.replay(&request, &token).await,
            Admission::Queued(reply) => reply.await.unwrap_or(Err(ApiError::Unauthorized)),
            Admission::NoCredential => Err(ApiError::NotAuthenticated),
        }
    }
}

impl std::fmt::Debug for TokenRefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRefreshCoordinator")
            .field("base_url", &self.inner.base_url)
            .finish()
    }
}

impl Inner {
    async fn send(&self, request: &ApiRequest, token: Option<&str>) -> Result<Response, ApiError> {
        let mut wire = HttpRequest::new(request.method, format!("{}{}", self.base_url, request.path));
        wire.headers = request.headers.clone();
        wire.body = request.body.clone();
        if let Some(token) = token {
            wire = wire.with_header("Authorization", format!("Bearer {}", token));
        }
        Ok(self.http.send(&wire).await?)
    }

    /// Send a second and final time. A second 401 is final.
    async fn replay(&self, request: &ApiRequest, token: &str) -> Reply {
        debug!(request_id = %request.id(), path = %request.path, "replaying request");
        let response = self.send(request, Some(token)).await?;
        if response.is_unauthorized() {
            warn!(request_id = %request.id(), "request still unauthorized after renewal");
            return Err(ApiError::Unauthorized);
        }
        finish(response)
    }

    async fn admit(self: &Arc<Self>, request: ApiRequest, sent_with: Option<String>) -> Admission {
        let mut state = self.renewal.lock().await;

        let Some(current) = self.session.credential() else {
            return Admission::NoCredential;
        };
        if sent_with.as_deref() != Some(current.token()) {
            return Admission::Replay(request, current.token().to_string());
        }

        let (reply, receiver) = oneshot::channel();
        state.queue.push_back(Waiter { request, reply });
        if !state.in_flight {
            state.in_flight = true;
            info!("starting credential renewal");
            tokio::spawn(Arc::clone(self).renew(current));
        }
        Admission::Queued(receiver)
    }

    async fn renew(self: Arc<Self>, stale: Credential) {
        let renewed = self.auth.renew(&stale).await;

        let (outcome, waiters) = {
            let mut state = self.renewal.lock().await;
            let outcome = match renewed {
                Ok(credential) => {
                    self.session.renewal_succeeded(credential.clone()).await;
                    // replay only with a credential the session actually holds
                    if self.session.is_authenticated() {
                        Ok(credential)
                    } else {
                        Err(AuthError::ExpiredCredential)
                    }
                }
                Err(e) => {
                    self.session.renewal_failed().await;
                    Err(e)
                }
            };
            state.in_flight = false;
            (outcome, std::mem::take(&mut state.queue))
        };

        match outcome {
            Ok(credential) => {
                info!(queued = waiters.len(), "credential renewed, replaying queued requests");
                let token = credential.token();
                let this = &self;
                let replays = waiters.into_iter().map(|waiter| async move {
                    let result = this.replay(&waiter.request, token).await;
                    let _ = waiter.reply.send(result);
                });
                join_all(replays).await;
            }
            Err(e) => {
                warn!(error = %e, queued = waiters.len(), "credential renewal failed");
                for waiter in waiters {
                    let _ = waiter.reply.send(Err(ApiError::SessionExpired(e.clone())));
                }
            }
        }
    }
}

fn finish(response: Response) -> Reply {
    if response.is_success() {
        return Ok(response);
    }
    let body = String::from_utf8_lossy(&response.body).into_owned();
    Err(ApiError::Status {
        status: response.status,
        body,
    })
}
