//! Error category classification.
//!
//! Every error this crate produces falls into one of five categories. The
//! category decides who handles it: the refresh coordinator, the reconnect
//! loop, or the caller.

use std::fmt;

/// High-level categorization of errors for handling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Credential missing, invalid or expired.
    /// Recoverable through a single renewal.
    Authorization,

    /// The renewal itself failed.
    /// Terminal for the session; presented as being logged out.
    Renewal,

    /// Socket or connection failure not caused by the application.
    /// Recovered by the reconnect loop.
    Transport,

    /// Malformed or out-of-sequence frames.
    /// Logged, never fatal.
    Protocol,

    /// Any other request failure (business errors, 4xx/5xx).
    /// Propagated to the caller untouched.
    Request,
}

impl ErrorCategory {
    /// Returns true if this layer recovers from the error on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Authorization | ErrorCategory::Transport)
    }

    /// Returns true if the user has to sign in again.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, ErrorCategory::Renewal)
    }

    /// Returns a short label for the category suitable for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Authorization => "authorization",
            ErrorCategory::Renewal => "renewal",
            ErrorCategory::Transport => "transport",
            ErrorCategory::Protocol => "protocol",
            ErrorCategory::Request => "request",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
