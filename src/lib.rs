//! mailpilot - session and connection resilience for the mailpilot client.
//!
//! Two components give the rest of the client an always-authenticated,
//! always-connected view of the backend:
//!
//! - [`coordinator::TokenRefreshCoordinator`] issues API requests and
//!   silently renews an expired credential, at most once at a time.
//! - [`live::ConnectionManager`] keeps an authenticated real-time channel
//!   open and reconnects with backoff when it drops.
//!
//! Both share an [`auth::SessionContext`].

pub mod adapters;
pub mod auth;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod live;
pub mod logging;
pub mod traits;

pub use auth::{AuthApi, Credential, SessionContext};
pub use config::ClientConfig;
pub use coordinator::{ApiRequest, TokenRefreshCoordinator};
pub use error::{ApiError, AuthError, ErrorCategory};
pub use live::{ConnectionManager, ConnectionStatus, LiveMessage, Phase};
