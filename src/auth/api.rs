//! Authentication endpoints: login, registration, OAuth token adoption and
//! credential renewal.
//!
//! These calls go straight to the [`HttpClient`] and never through the
//! refresh coordinator, so an authorization failure here can not trigger a
//! nested renewal.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::credential::Credential;
use super::session::SessionContext;
use crate::config::{AuthPaths, ClientConfig};
use crate::error::AuthError;
use crate::traits::{HttpClient, HttpRequest, Method, Response};

/// Body returned by login, register and refresh.
///
/// Other fields (`token_type`, `user`) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}

/// Client for the `/auth/*` endpoints.
#[derive(Clone)]
pub struct AuthApi {
    http: Arc<dyn HttpClient>,
    session: SessionContext,
    base_url: String,
    paths: AuthPaths,
}

impl AuthApi {
    pub fn new(http: Arc<dyn HttpClient>, session: SessionContext, config: &ClientConfig) -> Self {
        Self {
            http,
            session,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            paths: config.auth_paths.clone(),
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Password login. On success the session is authenticated.
    pub async fn login(&self, email: &str, password: &str) -> Result<Credential, AuthError> {
        let body = json!({ "email": email, "password": password });
        let credential = self.post_for_token(&self.paths.login, Some(&body), None).await?;
        self.session.login(credential.clone()).await;
        Ok(credential)
    }

    /// Create an account. On success the session is authenticated.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<Credential, AuthError> {
        let mut body = json!({ "email": email, "password": password });
        if let Some(name) = name {
            body["name"] = json!(name);
        }
        let credential = self
            .post_for_token(&self.paths.register, Some(&body), None)
            .await?;
        self.session.login(credential.clone()).await;
        Ok(credential)
    }

    /// Adopt a token delivered by an OAuth callback redirect.
    pub async fn adopt_oauth_token(&self, token: &str) -> Result<Credential, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MalformedResponse(
                "OAuth callback carried an empty token".to_string(),
            ));
        }
        let credential = ensure_unexpired(Credential::new(token))?;
        self.session.login(credential.clone()).await;
        Ok(credential)
    }

    pub async fn logout(&self) {
        self.session.logout().await;
    }

    /// Exchange a stale credential for a fresh one.
    ///
    /// Does not touch the session; the caller applies the outcome. A
    /// credential that is already expired on arrival is a failure.
    pub async fn renew(&self, stale: &Credential) -> Result<Credential, AuthError> {
        debug!("requesting credential renewal");
        self.post_for_token(&self.paths.refresh, None, Some(stale.token()))
            .await
    }

    /// Whether `path` is one of the authentication endpoints.
    pub fn is_auth_path(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    async fn post_for_token(
        &self,
        path: &str,
        body: Option<&serde_json::Value>,
        bearer: Option<&str>,
    ) -> Result<Credential, AuthError> {
        let mut request = HttpRequest::new(Method::Post, format!("{}{}", self.base_url, path))
            .with_header("Content-Type", "application/json");
        if let Some(body) = body {
            request = request.with_body(body.to_string());
        }
        if let Some(token) = bearer {
            request = request.with_header("Authorization", format!("Bearer {}", token));
        }

        let response = self.http.send(&request).await?;
        let credential = ensure_unexpired(parse_token_response(&response)?)?;
        info!(path, "credential issued");
        Ok(credential)
    }
}

impl std::fmt::Debug for AuthApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthApi")
            .field("base_url", &self.base_url)
            .field("paths", &self.paths)
            .finish()
    }
}

/// Turn an auth endpoint response into a credential.
///
/// Anything other than a 2xx with a non-empty `access_token` is a failure.
fn parse_token_response(response: &Response) -> Result<Credential, AuthError> {
    if !response.is_success() {
        let message = response.text().unwrap_or_default();
        warn!(status = response.status, "auth endpoint rejected request");
        return Err(AuthError::Rejected {
            status: response.status,
            message,
        });
    }

    let token: TokenResponse = response
        .json()
        .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
    if token.access_token.is_empty() {
        return Err(AuthError::MalformedResponse(
            "empty access_token".to_string(),
        ));
    }
    Ok(Credential::new(token.access_token))
}

/// Reject a credential the session would refuse to hold.
fn ensure_unexpired(credential: Credential) -> Result<Credential, AuthError> {
    if credential.is_expired() {
        warn!(expires_at = ?credential.expires_at(), "issued credential has already expired");
        return Err(AuthError::ExpiredCredential);
    }
    Ok(credential)
}
