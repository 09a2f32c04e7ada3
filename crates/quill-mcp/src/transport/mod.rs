//! Transport layer for MCP communication.
//!
//! A transport moves envelopes out and hands back whatever the peer sends,
//! classified only as data or fault. It never interprets replies; that is the
//! decoder's job.
//!
//! - [`StdioTransport`]: child process, newline or Content-Length framing
//! - [`HttpTransport`]: POST per envelope, JSON or SSE reply bodies
//! - [`ChannelTransport`]: in-memory pair for tests and embedders

mod channel;
mod http;
mod stdio;

pub use channel::{ChannelTransport, PeerHandle};
pub use http::{HttpTransport, HttpTransportConfig};
pub use stdio::{Framing, StdioTransport};

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::Envelope;
use crate::wire::Inbound;

/// A bidirectional, message-oriented link to one peer.
#[async_trait]
pub trait Transport: Send {
    /// Write one envelope. Failure is [`crate::McpError::TransportWrite`].
    async fn send(&mut self, envelope: &Envelope) -> Result<()>;

    /// Wait for the next inbound value.
    ///
    /// Returns [`crate::McpError::ConnectionClosed`] once the peer is gone.
    async fn receive(&mut self) -> Result<Inbound>;

    /// Release the underlying resources.
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        (**self).send(envelope).await
    }

    async fn receive(&mut self) -> Result<Inbound> {
        (**self).receive().await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}

/// Classify one complete frame of text.
fn frame_to_inbound(frame: &str) -> Inbound {
    Inbound::Data(crate::wire::WireValue::from_frame(frame))
}
