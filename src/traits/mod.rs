//! Trait abstractions for dependency injection and testability.
//!
//! # Traits
//!
//! - [`HttpClient`] - HTTP request execution
//! - [`ChannelConnector`] - Opening duplex sockets for the live channel
//! - [`CredentialsProvider`] - Credential persistence

pub mod credentials;
pub mod http;
pub mod websocket;

pub use credentials::{CredentialsError, CredentialsProvider};
pub use http::{Headers, HttpClient, HttpError, HttpRequest, Method, Response};
pub use websocket::{ChannelConnector, ChannelSocket, FrameSink, FrameStream, OutboundFrame, WsError};
