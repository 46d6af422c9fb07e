//! Authentication-related error types.
//!
//! These come out of the login, registration and renewal endpoints.

use thiserror::Error;

use super::ErrorCategory;
use crate::traits::HttpError;

/// Errors from the authentication endpoints.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuthError {
    /// The endpoint answered with a non-success status.
    #[error("Authentication rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The endpoint answered 2xx but the body had no usable `access_token`.
    #[error("Malformed authentication response: {0}")]
    MalformedResponse(String),

    /// The endpoint could not be reached.
    #[error("Authentication endpoint unreachable: {0}")]
    Transport(#[from] HttpError),

    /// The endpoint issued a credential whose `exp` has already passed.
    #[error("Issued credential has already expired")]
    ExpiredCredential,

    /// There is no credential to renew.
    #[error("No credential available")]
    NoCredential,
}

impl AuthError {
    /// Category of this error.
    ///
    /// Every failure of an auth endpoint ends the session, whether the
    /// endpoint rejected the call or was unreachable.
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Renewal
    }

    /// Status code returned by the endpoint, if it answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Get a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Rejected { status: 401, .. } | AuthError::NoCredential => {
                "Your session has expired. Please sign in again.".to_string()
            }
            AuthError::Rejected { message, .. } => format!("Sign-in failed: {}", message),
            AuthError::MalformedResponse(_) => {
                "The server sent an unexpected sign-in response.".to_string()
            }
            AuthError::ExpiredCredential => {
                "The server issued an expired session. Check your system clock.".to_string()
            }
            AuthError::Transport(_) => {
                "Could not reach the server to renew your session.".to_string()
            }
        }
    }
}
