//! Duplex channel trait abstraction.
//!
//! The connection manager never touches a concrete socket type. It asks a
//! [`ChannelConnector`] for a [`ChannelSocket`], which is a text frame sink
//! paired with a text frame stream. The stream ending means the socket is
//! gone, for whatever reason.

use async_trait::async_trait;
use futures::{Sink, Stream};
use std::pin::Pin;
use thiserror::Error;

/// Socket-level errors.
///
/// These never reach consumers; they only drive reconnection.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WsError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// Disconnected from server
    #[error("Disconnected from server")]
    Disconnected,
    /// Failed to send a frame
    #[error("Send failed: {0}")]
    SendFailed(String),
    /// Failed to receive a frame
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
}

/// A frame written by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// A UTF-8 text frame.
    Text(String),
    /// A close frame. The socket is released right after.
    Close { code: u16, reason: String },
}

/// Write half of an open socket.
pub type FrameSink = Pin<Box<dyn Sink<OutboundFrame, Error = WsError> + Send>>;

/// Read half of an open socket. Yields text payloads; ends on closure.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, WsError>> + Send>>;

/// An open duplex socket.
pub struct ChannelSocket {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl ChannelSocket {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

impl std::fmt::Debug for ChannelSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChannelSocket")
    }
}

/// Opens sockets to a channel endpoint.
///
/// The URL never carries a credential; authentication happens in-band after
/// the socket opens.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Open a new socket to `url`.
    async fn open(&self, url: &str) -> Result<ChannelSocket, WsError>;
}
