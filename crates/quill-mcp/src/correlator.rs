//! Request/reply correlation for one session.
//!
//! Only one request is ever in flight: [`Correlator::send_request`] hands
//! back a [`PendingReply`] that mutably borrows the correlator, so the next
//! request cannot be written until the previous reply has been awaited (or
//! abandoned by dropping it).

use std::collections::VecDeque;
use std::time::Duration;

use serde_json::Value;

use crate::error::{McpError, Result};
use crate::protocol::{Envelope, JsonRpcError};
use crate::transport::Transport;
use crate::wire::{Inbound, WireValue};

/// Abandoned ids remembered at most; the oldest is forgotten first.
const MAX_STALE: usize = 32;

/// Assigns ids, writes envelopes and pairs replies with requests.
pub struct Correlator<T> {
    transport: T,
    next_id: u64,
    stale: VecDeque<String>,
}

impl<T: Transport> Correlator<T> {
    /// Wrap a transport. The first id handed out is `"1"`.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_id: 0,
            stale: VecDeque::new(),
        }
    }

    /// Allocate the next request id.
    pub fn next_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    /// Write a request and return a handle for its reply.
    ///
    /// A write failure is returned as-is and never retried here.
    pub async fn send_request(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<PendingReply<'_, T>> {
        let id = self.next_id();
        let envelope = Envelope::request(id.clone(), method, params);
        tracing::debug!(id = %id, method, "sending MCP request");
        self.transport.send(&envelope).await?;
        Ok(PendingReply {
            correlator: self,
            id,
            method: method.to_string(),
        })
    }

    /// Write a notification. No reply is expected.
    pub async fn send_notification(&mut self, method: &str, params: Option<Value>) -> Result<()> {
        tracing::debug!(method, "sending MCP notification");
        self.transport
            .send(&Envelope::notification(method, params))
            .await
    }

    /// Ids whose replies were given up on and have not shown up since.
    pub fn stale_ids(&self) -> impl Iterator<Item = &str> {
        self.stale.iter().map(String::as_str)
    }

    fn abandon(&mut self, id: String) {
        if self.stale.len() == MAX_STALE {
            self.stale.pop_front();
        }
        self.stale.push_back(id);
    }

    /// Forget an abandoned id; true if it was remembered.
    fn forget(&mut self, id: &str) -> bool {
        match self.stale.iter().position(|s| s == id) {
            Some(pos) => {
                self.stale.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Close the underlying transport.
    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

/// The reply slot of one in-flight request.
#[must_use = "a request's reply must be awaited or explicitly dropped"]
pub struct PendingReply<'a, T> {
    correlator: &'a mut Correlator<T>,
    id: String,
    method: String,
}

impl<T: Transport> PendingReply<'_, T> {
    /// Id of the request this reply belongs to.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the reply, optionally bounded.
    ///
    /// A fault becomes [`McpError::PeerFault`] and a JSON-RPC error reply
    /// becomes [`McpError::ServerError`]. On expiry the request is abandoned
    /// and a reply that turns up for it later is discarded.
    pub async fn wait(mut self, timeout: Option<Duration>) -> Result<WireValue> {
        let Some(limit) = timeout else {
            return self.next_reply().await;
        };

        let outcome = tokio::time::timeout(limit, self.next_reply()).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    id = %self.id,
                    method = %self.method,
                    timeout_ms = limit.as_millis() as u64,
                    "abandoning MCP request after timeout"
                );
                self.correlator.abandon(self.id.clone());
                Err(McpError::timeout(&self.method, limit))
            }
        }
    }

    async fn next_reply(&mut self) -> Result<WireValue> {
        loop {
            let value = match self.correlator.transport.receive().await? {
                Inbound::Fault(fault) => {
                    if let Some(fault_id) = &fault.request_id
                        && *fault_id != self.id
                    {
                        self.correlator.forget(fault_id);
                        tracing::warn!(id = %fault_id, awaiting = %self.id, %fault, "discarding fault for another request");
                        continue;
                    }
                    tracing::debug!(id = %self.id, %fault, "peer fault in place of reply");
                    return Err(fault.into());
                }
                Inbound::Data(value) => value,
            };

            if let Some(reply_id) = value.reply_id()
                && reply_id != self.id
            {
                if self.correlator.forget(&reply_id) {
                    tracing::warn!(id = %reply_id, awaiting = %self.id, "discarding stale reply");
                } else {
                    tracing::warn!(id = %reply_id, awaiting = %self.id, "discarding reply with unexpected id");
                }
                continue;
            }

            if let Some(obj) = value.as_structured().and_then(Value::as_object)
                && obj.contains_key("method")
                && !obj.contains_key("result")
                && !obj.contains_key("error")
            {
                tracing::debug!(method = ?obj.get("method"), "ignoring server-initiated message");
                continue;
            }

            if let Some(error) = value
                .as_structured()
                .and_then(|v| v.get("error"))
                .filter(|e| !e.is_null())
            {
                return Err(server_error(error));
            }

            tracing::trace!(id = %self.id, reply = %value, "received MCP reply");
            return Ok(value);
        }
    }
}

fn server_error(error: &Value) -> McpError {
    match serde_json::from_value::<JsonRpcError>(error.clone()) {
        Ok(e) => McpError::server_error(e.code, e.message, e.data),
        Err(_) => McpError::server_error(
            JsonRpcError::INTERNAL_ERROR,
            error.to_string(),
            Some(error.clone()),
        ),
    }
}
