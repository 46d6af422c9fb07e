//! Error handling for the session and connection layer.
//!
//! | Type | Raised by | Category |
//! |------|-----------|----------|
//! | [`ApiError`] | `TokenRefreshCoordinator::issue` | depends on variant |
//! | [`AuthError`] | login, registration, renewal | Renewal |
//! | [`crate::traits::HttpError`] | HTTP adapters | Transport |
//! | [`crate::traits::WsError`] | socket adapters | Transport |
//!
//! Connection loss is never an error at this layer's boundary: it shows up
//! as a change in [`crate::live::ConnectionStatus`] instead.

mod api;
mod auth;
mod category;

pub use api::ApiError;
pub use auth::AuthError;
pub use category::ErrorCategory;
