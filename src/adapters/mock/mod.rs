//! Mock implementations for testing.
//!
//! # Available Mocks
//!
//! - [`MockHttpClient`] - HTTP client with fixed or per-request responses
//! - [`MockConnector`] - in-memory live channel with a scriptable server side
//! - [`InMemoryCredentials`] - in-memory credential storage

pub mod credentials;
pub mod http;
pub mod websocket;

pub use credentials::InMemoryCredentials;
pub use http::{MockHttpClient, MockResponse};
pub use websocket::{MockConnector, MockPeer};
