//! The bearer credential and its embedded claims.
//!
//! Tokens are JWTs issued by the mailpilot backend. The payload segment is
//! decoded locally (no signature check) to learn the expiry and the subject,
//! so expiry can be detected without a network call.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Deserialize)]
struct JwtClaims {
    exp: Option<i64>,
    sub: Option<String>,
}

/// Decode the payload segment of a JWT.
///
/// Returns `None` for opaque (non-JWT) tokens or undecodable payloads.
fn decode_claims(token: &str) -> Option<JwtClaims> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// An access credential for the mailpilot API and live channel.
///
/// Serialized form is what the file credentials store writes to disk.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    access_token: String,
    /// Expiry as Unix timestamp (seconds). `None` when the token carries no `exp`.
    expires_at: Option<i64>,
    /// Subject (user id) claim.
    subject: Option<String>,
}

impl Credential {
    /// Wrap a bearer token, decoding its expiry and subject claims.
    pub fn new(access_token: impl Into<String>) -> Self {
        let access_token = access_token.into();
        let claims = decode_claims(&access_token);
        let (expires_at, subject) = match claims {
            Some(claims) => (claims.exp, claims.sub),
            None => (None, None),
        };
        Self {
            access_token,
            expires_at,
            subject,
        }
    }

    /// The raw bearer string.
    pub fn token(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> Option<i64> {
        self.expires_at
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Check expiry against a caller-supplied clock.
    ///
    /// Tokens without an `exp` claim never expire locally; the server remains
    /// the authority and will answer with 401.
    pub fn is_expired_at(&self, now: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }

    /// Check expiry against the wall clock.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp())
    }

    /// Seconds until expiry, clamped at zero.
    pub fn expires_in(&self) -> Option<u64> {
        let now = chrono::Utc::now().timestamp();
        self.expires_at.map(|exp| (exp - now).max(0) as u64)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("subject", &self.subject)
            .finish()
    }
}

/// Build an unsigned JWT with the given claims. Test fixture helper.
#[cfg(test)]
pub(crate) fn make_jwt(exp: Option<i64>, sub: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = match exp {
        Some(exp) => serde_json::json!({ "exp": exp, "sub": sub }),
        None => serde_json::json!({ "sub": sub }),
    };
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    let signature = URL_SAFE_NO_PAD.encode("fake-signature");
    format!("{}.{}.{}", header, payload, signature)
}
