//! Scripted in-memory live channel for testing.
//!
//! Every [`MockConnector::open`] call creates a pair of unbounded channels and
//! hands the server half to the test as a [`MockPeer`]. The test plays the
//! server: it reads what the client wrote, pushes frames, and closes the
//! socket to simulate network loss.

use async_trait::async_trait;
use futures::channel::mpsc as fmpsc;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

use crate::traits::{ChannelConnector, ChannelSocket, OutboundFrame, WsError};

/// Connector that opens in-memory sockets.
#[derive(Debug)]
pub struct MockConnector {
    peers_tx: mpsc::UnboundedSender<MockPeer>,
    opened: AtomicUsize,
    fail_next: AtomicUsize,
}

impl MockConnector {
    /// Create a connector and the receiver on which each opened socket's
    /// server half arrives.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        let connector = Self {
            peers_tx,
            opened: AtomicUsize::new(0),
            fail_next: AtomicUsize::new(0),
        };
        (connector, peers_rx)
    }

    /// Make the next `count` opens fail.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Number of open attempts so far, failed ones included.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelConnector for MockConnector {
    async fn open(&self, url: &str) -> Result<ChannelSocket, WsError> {
        self.opened.fetch_add(1, Ordering::SeqCst);

        let refuse = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refuse {
            return Err(WsError::ConnectionFailed("mock connection refused".to_string()));
        }

        let (client_tx, server_rx) = fmpsc::unbounded::<OutboundFrame>();
        let (server_tx, client_rx) = fmpsc::unbounded::<Result<String, WsError>>();

        let peer = MockPeer {
            url: url.to_string(),
            from_client: server_rx,
            to_client: Some(server_tx),
        };
        let _ = self.peers_tx.send(peer);

        let sink = client_tx.sink_map_err(|e| WsError::SendFailed(e.to_string()));
        Ok(ChannelSocket::new(Box::pin(sink), Box::pin(client_rx)))
    }
}

/// Server side of one mock socket.
#[derive(Debug)]
pub struct MockPeer {
    url: String,
    from_client: fmpsc::UnboundedReceiver<OutboundFrame>,
    to_client: Option<fmpsc::UnboundedSender<Result<String, WsError>>>,
}

impl MockPeer {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Push a text frame to the client. Returns false if the client is gone.
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        match &self.to_client {
            Some(tx) => tx.unbounded_send(Ok(text.into())).is_ok(),
            None => false,
        }
    }

    pub fn push_json(&self, value: &Value) -> bool {
        self.push_text(value.to_string())
    }

    /// Send the server's authentication acknowledgment.
    pub fn ack(&self) -> bool {
        self.push_json(&json!({ "type": "connected" }))
    }

    pub fn ping(&self) -> bool {
        self.push_json(&json!({ "type": "ping" }))
    }

    /// Deliver a receive error to the client.
    pub fn fail(&self, error: WsError) -> bool {
        match &self.to_client {
            Some(tx) => tx.unbounded_send(Err(error)).is_ok(),
            None => false,
        }
    }

    /// Close the socket from the server side.
    pub fn close(&mut self) {
        self.to_client = None;
    }

    /// Wait for the next frame the client writes. `None` once the client has
    /// dropped its end.
    pub async fn next_frame(&mut self) -> Option<OutboundFrame> {
        self.from_client.next().await
    }

    /// Wait for the next text frame and decode it as JSON.
    pub async fn next_json(&mut self) -> Option<Value> {
        loop {
            match self.next_frame().await? {
                OutboundFrame::Text(text) => return serde_json::from_str(&text).ok(),
                OutboundFrame::Close { .. } => return None,
            }
        }
    }

    /// Frames already written by the client, without waiting.
    pub fn drain_frames(&mut self) -> Vec<OutboundFrame> {
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = self.from_client.try_next() {
            frames.push(frame);
        }
        frames
    }

    /// Whether the client has dropped its end of the socket.
    pub fn is_released(&self) -> bool {
        self.to_client.as_ref().map_or(true, |tx| tx.is_closed())
    }
}
