//! Authentication for the mailpilot client.
//!
//! - [`Credential`]: the bearer token and its locally decoded claims
//! - [`SessionContext`]: the observable credential store shared by the
//!   request coordinator and the live channel
//! - [`AuthApi`]: login, registration, OAuth token adoption and renewal

pub mod api;
pub mod credential;
pub mod session;

pub use api::{AuthApi, TokenResponse};
pub use credential::Credential;
pub use session::{SessionContext, SessionState};
