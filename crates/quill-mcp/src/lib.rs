//! MCP (Model Context Protocol) client for Quill.
//!
//! This crate connects to MCP tool servers, discovers their tools and invokes
//! them. Servers in the wild do not agree on a reply shape, so every reply is
//! run through a tolerant, multi-stage decoder before it reaches the caller.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpClient                                                  │
//! │  - Session state: initialized flag, discovered tools        │
//! │  - bootstrap, discover_tools, call_tool -> CallOutcome      │
//! └─────────────────────────────────────────────────────────────┘
//!                │                               ▲
//!                ▼                               │
//! ┌──────────────────────────────┐ ┌─────────────────────────────┐
//! │  Correlator                  │ │  ResponseDecoder            │
//! │  - ids "1", "2", ...         │ │  - native result object     │
//! │  - one request in flight     │ │  - debug-dump literal (x2)  │
//! │  - bounded reply wait        │ │  - text field regex         │
//! └──────────────────────────────┘ └─────────────────────────────┘
//!                │
//!                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Transport                                                  │
//! │  - Stdio (newline or Content-Length framing)                │
//! │  - Streamable HTTP (JSON or SSE bodies)                     │
//! │  - In-memory channel                                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use quill_mcp::{CallOutcome, ClientOptions, McpClient, McpServerConfig};
//!
//! let config = McpServerConfig::new("db", "db-tools-server").with_arg("--readonly");
//! let mut client = McpClient::connect(&config, ClientOptions::default())?;
//! client.bootstrap().await?;
//!
//! for tool in client.available_tools() {
//!     println!("{}: {:?}", tool.name, tool.description);
//! }
//!
//! match client.call_tool("list_tables", json!({})).await? {
//!     CallOutcome::Text(text) => println!("Result: {text}"),
//!     CallOutcome::ToolError { message } => println!("Error: {message}"),
//!     other => println!("{other:?}"),
//! }
//! ```
//!
//! # MCP Protocol
//!
//! The protocol flow is:
//! 1. Client sends `initialize` with capabilities
//! 2. Server responds with its capabilities
//! 3. Client sends `notifications/initialized`
//! 4. Client can now call `tools/list` and `tools/call`
//!
//! Tool-level failures (`isError`) and replies the decoder cannot read are
//! values, not errors: see [`CallOutcome`].

pub mod client;
pub mod correlator;
pub mod decode;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod result;
pub mod transport;
pub mod wire;

// Re-export main types
pub use client::{
    CallOutcome, ClientOptions, McpClient, McpServerConfig, Session, TransportType,
};
pub use correlator::{Correlator, PendingReply};
pub use decode::{DecodeOutcome, DecodeStage, ResponseDecoder};
pub use error::{McpError, Result};
pub use manager::{ConnectSummary, DynClient, McpManager};
pub use protocol::{
    CallToolParams, ClientCapabilities, ClientInfo, Envelope, InitializeParams, JsonRpcError,
    ServerInfo, ToolInfo,
};
pub use result::{ContentItem, ToolResult};
pub use transport::{
    ChannelTransport, Framing, HttpTransport, HttpTransportConfig, PeerHandle, StdioTransport,
    Transport,
};
pub use wire::{Inbound, PeerFault, WireValue};
