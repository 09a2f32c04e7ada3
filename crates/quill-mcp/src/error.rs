//! Error types for MCP operations.

use std::time::Duration;

use thiserror::Error;

use crate::wire::PeerFault;

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Error type for MCP operations.
///
/// Only transport-level and protocol-level failures live here. A tool that
/// reports `isError` and a reply the decoder cannot interpret are both
/// ordinary values (see [`crate::CallOutcome`]).
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to spawn the MCP server process.
    #[error("failed to spawn MCP server: {0}")]
    SpawnFailed(String),

    /// Writing an outbound envelope failed.
    #[error("failed to write to transport: {0}")]
    TransportWrite(String),

    /// Failed to communicate with the MCP server.
    #[error("transport error: {0}")]
    Transport(String),

    /// No reply arrived within the bound.
    #[error("timed out after {timeout:?} waiting for '{method}' reply")]
    ResponseTimeout {
        /// Method of the abandoned request.
        method: String,
        /// The bound that expired.
        timeout: Duration,
    },

    /// The transport delivered an error object instead of data.
    #[error("peer fault: {0}")]
    PeerFault(PeerFault),

    /// Server returned a JSON-RPC error response.
    #[error("server error {code}: {message}")]
    ServerError {
        /// Error code from the server.
        code: i64,
        /// Error message from the server.
        message: String,
        /// Optional additional data.
        data: Option<serde_json::Value>,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Server configuration cannot be turned into a transport.
    #[error("invalid server configuration: {0}")]
    InvalidConfig(String),

    /// No connected server with this name.
    #[error("MCP server '{0}' is not connected")]
    UnknownServer(String),

    /// Session has not completed the handshake.
    #[error("session not initialized - call bootstrap() first")]
    NotInitialized,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,
}

impl McpError {
    /// Create a spawn failed error.
    pub fn spawn_failed(msg: impl Into<String>) -> Self {
        Self::SpawnFailed(msg.into())
    }

    /// Create a transport write error.
    pub fn transport_write(msg: impl Into<String>) -> Self {
        Self::TransportWrite(msg.into())
    }

    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a response timeout error.
    pub fn timeout(method: impl Into<String>, timeout: Duration) -> Self {
        Self::ResponseTimeout {
            method: method.into(),
            timeout,
        }
    }

    /// Create a server error from an error response.
    pub fn server_error(
        code: i64,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
            data,
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether the error only affects the call in flight.
    ///
    /// Session-fatal errors mean the transport is gone and the client has to
    /// be rebuilt.
    pub fn is_call_scoped(&self) -> bool {
        !matches!(
            self,
            Self::ConnectionClosed
                | Self::SpawnFailed(_)
                | Self::InvalidConfig(_)
                | Self::UnknownServer(_)
        )
    }
}

impl From<PeerFault> for McpError {
    fn from(fault: PeerFault) -> Self {
        Self::PeerFault(fault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = McpError::spawn_failed("command not found");
        assert!(err.to_string().contains("spawn"));
        assert!(err.to_string().contains("command not found"));

        let err = McpError::server_error(-32600, "Invalid Request", None);
        assert!(err.to_string().contains("-32600"));
        assert!(err.to_string().contains("Invalid Request"));
    }

    #[test]
    fn test_timeout_display_names_method() {
        let err = McpError::timeout("tools/list", Duration::from_secs(5));
        let msg = err.to_string();
        assert!(msg.contains("tools/list"));
        assert!(msg.contains("5s"));
    }

    #[test]
    fn test_peer_fault_conversion() {
        let err: McpError = PeerFault::new("boom").into();
        assert!(matches!(err, McpError::PeerFault(_)));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_call_scoped() {
        assert!(McpError::timeout("x", Duration::from_millis(1)).is_call_scoped());
        assert!(McpError::transport_write("pipe").is_call_scoped());
        assert!(!McpError::ConnectionClosed.is_call_scoped());
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let mcp_err: McpError = json_err.into();
        assert!(matches!(mcp_err, McpError::Json(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let mcp_err: McpError = io_err.into();
        assert!(matches!(mcp_err, McpError::Io(_)));
    }
}
