//! tokio-tungstenite live channel adapter.
//!
//! Opens a WebSocket and exposes it as text frames. Binary frames are decoded
//! as UTF-8, lossily if need be, so an undecodable payload still reaches the
//! malformed-frame path. Ping/pong control frames are handled by tungstenite
//! itself and never surface.

use async_trait::async_trait;
use futures_util::{future, SinkExt, StreamExt};
use std::borrow::Cow;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::traits::{ChannelConnector, ChannelSocket, OutboundFrame, WsError};

/// Production [`ChannelConnector`] over tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self
    }
}

fn to_message(frame: OutboundFrame) -> Message {
    match frame {
        OutboundFrame::Text(text) => Message::Text(text),
        OutboundFrame::Close { code, reason } => Message::Close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Owned(reason),
        })),
    }
}

/// Map an incoming message to a text payload.
///
/// `None` skips the message; `Some(Err(Disconnected))` ends the stream.
fn from_message(
    message: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<String, WsError>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(text)),
        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
            Ok(text) => Some(Ok(text)),
            Err(e) => {
                warn!(len = e.as_bytes().len(), "non-UTF-8 binary frame, forwarding lossily");
                Some(Ok(String::from_utf8_lossy(e.as_bytes()).into_owned()))
            }
        },
        Ok(Message::Close(frame)) => {
            debug!(?frame, "server closed live channel");
            Some(Err(WsError::Disconnected))
        }
        Ok(_) => None,
        Err(e) => Some(Err(WsError::ReceiveFailed(e.to_string()))),
    }
}

#[async_trait]
impl ChannelConnector for TungsteniteConnector {
    async fn open(&self, url: &str) -> Result<ChannelSocket, WsError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;
        debug!(url, "live channel socket open");

        let (sink, stream) = stream.split();

        let sink = sink
            .sink_map_err(|e| WsError::SendFailed(e.to_string()))
            .with(|frame: OutboundFrame| future::ready(Ok::<_, WsError>(to_message(frame))));
        let stream = stream.filter_map(|message| future::ready(from_message(message)));

        Ok(ChannelSocket::new(Box::pin(sink), Box::pin(stream)))
    }
}
