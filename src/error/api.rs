//! Errors surfaced to callers of [`TokenRefreshCoordinator::issue`].
//!
//! Callers only ever see a final outcome. Authorization failures that the
//! coordinator recovered from never show up here.
//!
//! [`TokenRefreshCoordinator::issue`]: crate::coordinator::TokenRefreshCoordinator::issue

use thiserror::Error;

use super::{AuthError, ErrorCategory};
use crate::traits::HttpError;

/// Final outcome of a failed request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// The request never got a response.
    #[error("Request failed: {0}")]
    Transport(#[from] HttpError),

    /// The server answered with a non-success status that is not an
    /// authorization failure (or came from an auth endpoint).
    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Still unauthorized after a successful renewal and one replay.
    #[error("Request unauthorized after credential renewal")]
    Unauthorized,

    /// Renewal failed; the session has been forced to logged out.
    #[error("Session expired: {0}")]
    SessionExpired(AuthError),

    /// Authorization failed and there was no credential to renew.
    #[error("Not authenticated")]
    NotAuthenticated,
}

impl ApiError {
    /// Category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ApiError::Transport(_) => ErrorCategory::Transport,
            ApiError::Status { .. } => ErrorCategory::Request,
            ApiError::Unauthorized => ErrorCategory::Authorization,
            ApiError::SessionExpired(_) | ApiError::NotAuthenticated => ErrorCategory::Renewal,
        }
    }

    /// Returns true if the UI should send the user back to the login screen.
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized | ApiError::SessionExpired(_) | ApiError::NotAuthenticated
        )
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Unauthorized => Some(401),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ApiError::Status {
            status: 404,
            body: "not found".to_string(),
        };
        assert_eq!(err.to_string(), "Server returned 404: not found");
        assert_eq!(
            ApiError::Unauthorized.to_string(),
            "Request unauthorized after credential renewal"
        );
        assert_eq!(ApiError::NotAuthenticated.to_string(), "Not authenticated");
    }

    #[test]
    fn test_api_error_categories() {
        assert_eq!(
            ApiError::Transport(HttpError::Cancelled).category(),
            ErrorCategory::Transport
        );
        assert_eq!(
            ApiError::Status {
                status: 500,
                body: String::new()
            }
            .category(),
            ErrorCategory::Request
        );
        assert_eq!(
            ApiError::SessionExpired(AuthError::NoCredential).category(),
            ErrorCategory::Renewal
        );
    }

    #[test]
    fn test_requires_reauth() {
        assert!(ApiError::Unauthorized.requires_reauth());
        assert!(ApiError::NotAuthenticated.requires_reauth());
        assert!(ApiError::SessionExpired(AuthError::NoCredential).requires_reauth());
        assert!(!ApiError::Status {
            status: 403,
            body: String::new()
        }
        .requires_reauth());
        assert!(!ApiError::Transport(HttpError::Cancelled).requires_reauth());
    }

    #[test]
    fn test_status_accessor() {
        assert_eq!(ApiError::Unauthorized.status(), Some(401));
        assert_eq!(ApiError::NotAuthenticated.status(), None);
    }
}
