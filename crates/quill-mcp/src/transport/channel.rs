use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{McpError, Result};
use crate::protocol::Envelope;
use crate::transport::Transport;
use crate::wire::Inbound;

/// In-memory transport backed by two unbounded channels.
#[derive(Debug)]
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<Envelope>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    closed: bool,
}

/// The far end of a [`ChannelTransport`].
#[derive(Debug)]
pub struct PeerHandle {
    requests: mpsc::UnboundedReceiver<Envelope>,
    replies: mpsc::UnboundedSender<Inbound>,
}

impl ChannelTransport {
    /// Create a connected transport/peer pair.
    pub fn pair() -> (Self, PeerHandle) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound: out_tx,
                inbound: in_rx,
                closed: false,
            },
            PeerHandle {
                requests: out_rx,
                replies: in_tx,
            },
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        if self.closed {
            return Err(McpError::transport_write("transport closed"));
        }
        self.outbound
            .send(envelope.clone())
            .map_err(|_| McpError::transport_write("peer dropped"))
    }

    async fn receive(&mut self) -> Result<Inbound> {
        if self.closed {
            return Err(McpError::ConnectionClosed);
        }
        self.inbound.recv().await.ok_or(McpError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.inbound.close();
        Ok(())
    }
}

impl PeerHandle {
    /// Next envelope written by the client, or `None` once it is gone.
    pub async fn next_request(&mut self) -> Option<Envelope> {
        self.requests.recv().await
    }

    /// Push an inbound value to the client.
    ///
    /// Returns `false` if the client side has been dropped or closed.
    pub fn reply(&self, inbound: impl Into<Inbound>) -> bool {
        self.replies.send(inbound.into()).is_ok()
    }

    /// Envelopes written so far and not yet read.
    pub fn drain(&mut self) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(envelope) = self.requests.try_recv() {
            out.push(envelope);
        }
        out
    }
}
