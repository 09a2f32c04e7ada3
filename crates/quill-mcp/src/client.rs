//! MCP client for communicating with MCP servers.

use std::time::Duration;

use serde_json::{Value, json};

use crate::correlator::Correlator;
use crate::decode::{DecodeOutcome, ResponseDecoder};
use crate::error::{McpError, Result};
use crate::protocol::{
    CallToolParams, ClientCapabilities, ClientInfo, InitializeParams, MCP_PROTOCOL_VERSION,
    ServerInfo, ToolInfo, methods,
};
use crate::result::ToolResult;
use crate::transport::{Framing, HttpTransport, HttpTransportConfig, StdioTransport, Transport};
use crate::wire::WireValue;

/// Transport type for MCP server connections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TransportType {
    /// Stdio transport - spawns a child process.
    #[default]
    Stdio,
    /// HTTP transport - POSTs to a streamable-HTTP endpoint.
    Http,
}

/// Configuration for an MCP server connection.
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    /// Unique name for this server.
    pub name: String,
    /// Transport type.
    pub transport: TransportType,
    /// Command to spawn (for stdio transport).
    pub command: String,
    /// URL for the server (for HTTP transport).
    pub url: Option<String>,
    /// Arguments to pass to the command.
    pub args: Vec<String>,
    /// Environment variables to set.
    pub env: Vec<(String, String)>,
    /// Message framing on the pipe (for stdio transport).
    pub framing: Framing,
    /// HTTP headers (for HTTP transport).
    pub headers: Vec<(String, String)>,
    /// Request timeout (for HTTP transport).
    pub timeout: Option<Duration>,
    /// Number of retries (for HTTP transport).
    pub retries: Option<u32>,
}

impl McpServerConfig {
    /// Create a new server config for stdio transport.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportType::Stdio,
            command: command.into(),
            url: None,
            args: Vec::new(),
            env: Vec::new(),
            framing: Framing::default(),
            headers: Vec::new(),
            timeout: None,
            retries: None,
        }
    }

    /// Create a new server config for HTTP transport.
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            transport: TransportType::Http,
            url: Some(url.into()),
            ..Self::new(name, String::new())
        }
    }

    /// Add arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set stdio framing.
    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// Add an HTTP header (for HTTP transport).
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Set request timeout (for HTTP transport).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set number of retries (for HTTP transport).
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Check if this is an HTTP transport config.
    pub fn is_http(&self) -> bool {
        self.transport == TransportType::Http
    }

    /// Check if this is a stdio transport config.
    pub fn is_stdio(&self) -> bool {
        self.transport == TransportType::Stdio
    }

    /// Open the transport this config describes.
    pub fn open_transport(&self) -> Result<Box<dyn Transport>> {
        match self.transport {
            TransportType::Stdio => {
                if self.command.is_empty() {
                    return Err(McpError::invalid_config(format!(
                        "server '{}' has no command",
                        self.name
                    )));
                }
                let transport =
                    StdioTransport::spawn(&self.command, &self.args, &self.env, self.framing)?;
                tracing::info!(
                    server = %self.name,
                    command = %self.command,
                    "connected to MCP server via stdio"
                );
                Ok(Box::new(transport))
            }
            TransportType::Http => {
                let url = self.url.as_ref().ok_or_else(|| {
                    McpError::invalid_config(format!("server '{}' has no URL", self.name))
                })?;
                let mut http_config = HttpTransportConfig::new(url);
                if let Some(timeout) = self.timeout {
                    http_config = http_config.with_timeout(timeout);
                }
                if let Some(retries) = self.retries {
                    http_config = http_config.with_retries(retries);
                }
                for (key, value) in &self.headers {
                    http_config = http_config.with_header(key, value);
                }
                let transport = HttpTransport::connect(http_config)?;
                tracing::info!(server = %self.name, url = %url, "connected to MCP server via HTTP");
                Ok(Box::new(transport))
            }
        }
    }
}

/// Session-independent client settings.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Identity sent in the handshake.
    pub client_info: ClientInfo,
    /// Protocol version sent in the handshake.
    pub protocol_version: String,
    /// Bound on the `initialize` reply. `None` waits forever.
    pub handshake_timeout: Option<Duration>,
    /// Bound on the `tools/list` reply.
    pub discovery_timeout: Option<Duration>,
    /// Bound on `tools/call` replies. Unbounded by default.
    pub call_timeout: Option<Duration>,
    /// Debug-dump markers the decoder recognises.
    pub markers: Vec<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            client_info: ClientInfo::default(),
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            handshake_timeout: Some(Duration::from_secs(30)),
            discovery_timeout: Some(Duration::from_secs(5)),
            call_timeout: None,
            markers: crate::decode::DEFAULT_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl ClientOptions {
    /// Set the bound on tool call replies.
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the bound on the discovery reply.
    pub fn with_discovery_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the bound on the handshake reply.
    pub fn with_handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Replace the decoder markers.
    pub fn with_markers(mut self, markers: Vec<String>) -> Self {
        self.markers = markers;
        self
    }
}

/// Per-connection protocol state.
#[derive(Debug, Clone, Default)]
pub struct Session {
    initialized: bool,
    server_info: Option<ServerInfo>,
    available_tools: Vec<ToolInfo>,
}

impl Session {
    /// Whether the handshake has completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Server identity, when the handshake reply carried a readable one.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Tools from the last successful discovery.
    pub fn available_tools(&self) -> &[ToolInfo] {
        &self.available_tools
    }
}

/// What a tool call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// The tool succeeded and its first content item carries text.
    Text(String),
    /// The tool reported a failure.
    ToolError {
        /// Failure reason.
        message: String,
    },
    /// The tool succeeded but there is no leading text to show.
    Content(ToolResult),
    /// The reply could not be interpreted.
    Unrecognized(WireValue),
}

impl CallOutcome {
    /// Whether the tool reported a failure.
    pub fn is_tool_error(&self) -> bool {
        matches!(self, Self::ToolError { .. })
    }

    /// The text of a [`CallOutcome::Text`].
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<DecodeOutcome> for CallOutcome {
    fn from(outcome: DecodeOutcome) -> Self {
        match outcome {
            DecodeOutcome::Unrecognized(raw) => Self::Unrecognized(raw),
            DecodeOutcome::Decoded(result) if result.is_failure() => Self::ToolError {
                message: result
                    .failure_message()
                    .unwrap_or("tool reported an error")
                    .to_string(),
            },
            DecodeOutcome::Decoded(result) => match result.first_text() {
                Some(text) => Self::Text(text.to_string()),
                None => Self::Content(result),
            },
        }
    }
}

/// An MCP client connected to a single MCP server.
pub struct McpClient<T> {
    name: String,
    correlator: Correlator<T>,
    decoder: ResponseDecoder,
    options: ClientOptions,
    session: Session,
}

impl McpClient<Box<dyn Transport>> {
    /// Connect to an MCP server using the configured transport.
    ///
    /// This does NOT initialize the connection - call `bootstrap()` after connecting.
    pub fn connect(config: &McpServerConfig, options: ClientOptions) -> Result<Self> {
        let transport = config.open_transport()?;
        Ok(Self::new(&config.name, transport, options))
    }
}

impl<T: Transport> McpClient<T> {
    /// Create a client over an already open transport.
    pub fn new(name: impl Into<String>, transport: T, options: ClientOptions) -> Self {
        Self {
            name: name.into(),
            correlator: Correlator::new(transport),
            decoder: ResponseDecoder::with_markers(options.markers.iter().cloned()),
            options,
            session: Session::default(),
        }
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current session state.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Get the server info (after initialization).
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.session.server_info()
    }

    /// Check if the client has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.session.initialized
    }

    /// Tools from the last successful discovery.
    pub fn available_tools(&self) -> &[ToolInfo] {
        &self.session.available_tools
    }

    /// Look up a discovered tool by name.
    pub fn tool(&self, name: &str) -> Option<&ToolInfo> {
        self.session.available_tools.iter().find(|t| t.name == name)
    }

    /// The decoder used for replies.
    pub fn decoder(&self) -> &ResponseDecoder {
        &self.decoder
    }

    /// Handshake, then discover tools.
    ///
    /// A handshake failure is returned. A discovery failure is logged and
    /// leaves the tool list empty; the session is initialized either way.
    pub async fn bootstrap(&mut self) -> Result<()> {
        self.handshake().await?;
        let discovered = self.discover_tools().await.map(|tools| tools.len());
        if let Err(e) = discovered {
            tracing::warn!(server = %self.name, error = %e, "tool discovery failed");
        }
        Ok(())
    }

    async fn handshake(&mut self) -> Result<()> {
        let params = InitializeParams {
            protocol_version: self.options.protocol_version.clone(),
            capabilities: ClientCapabilities::default(),
            client_info: self.options.client_info.clone(),
        };
        let reply = self
            .correlator
            .send_request(methods::INITIALIZE, Some(serde_json::to_value(&params)?))
            .await?
            .wait(self.options.handshake_timeout)
            .await?;

        let payload = self.decoder.decode_payload(&reply);
        let server_info = payload
            .as_ref()
            .and_then(|p| p.get("serverInfo"))
            .and_then(|v| serde_json::from_value::<ServerInfo>(v.clone()).ok());
        let protocol = payload
            .as_ref()
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str);

        match &server_info {
            Some(info) => tracing::info!(
                server = %self.name,
                peer = %info.name,
                version = info.version.as_deref().unwrap_or("unknown"),
                protocol = protocol.unwrap_or("unknown"),
                "MCP server initialized"
            ),
            None => tracing::info!(server = %self.name, "MCP server initialized"),
        }

        if let Err(e) = self
            .correlator
            .send_notification(methods::INITIALIZED, None)
            .await
        {
            tracing::warn!(server = %self.name, error = %e, "failed to send initialized notification");
        }

        self.session.server_info = server_info;
        self.session.initialized = true;
        Ok(())
    }

    /// Refresh the tool list from the server.
    ///
    /// The list is replaced wholesale. An unreadable reply leaves it empty.
    pub async fn discover_tools(&mut self) -> Result<&[ToolInfo]> {
        if !self.session.initialized {
            return Err(McpError::NotInitialized);
        }

        let reply = self
            .correlator
            .send_request(methods::TOOLS_LIST, None)
            .await?
            .wait(self.options.discovery_timeout)
            .await?;

        self.session.available_tools = match self.decoder.decode_tools(&reply) {
            Some(tools) => tools,
            None => {
                tracing::warn!(server = %self.name, reply = %reply, "could not read tool listing");
                Vec::new()
            }
        };

        tracing::debug!(
            server = %self.name,
            tool_count = self.session.available_tools.len(),
            "listed MCP tools"
        );

        Ok(&self.session.available_tools)
    }

    /// Call a tool on the server.
    ///
    /// An uninitialized session is handshaken first (without discovery).
    ///
    /// # Arguments
    /// * `name` - The name of the tool to call
    /// * `arguments` - The arguments to pass to the tool
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<CallOutcome> {
        if !self.session.initialized {
            tracing::debug!(server = %self.name, "session not initialized, handshaking first");
            self.handshake().await?;
        }

        let params = CallToolParams {
            name: name.to_string(),
            arguments: if arguments.is_null() { json!({}) } else { arguments },
        };

        let reply = self
            .correlator
            .send_request(methods::TOOLS_CALL, Some(serde_json::to_value(&params)?))
            .await?
            .wait(self.options.call_timeout)
            .await?;

        let outcome = CallOutcome::from(self.decoder.decode(&reply));
        match &outcome {
            CallOutcome::ToolError { message } => tracing::warn!(
                server = %self.name,
                tool = %name,
                message = %message,
                "tool call returned error"
            ),
            CallOutcome::Unrecognized(_) => tracing::warn!(
                server = %self.name,
                tool = %name,
                "tool reply not recognized"
            ),
            _ => tracing::debug!(server = %self.name, tool = %name, "tool call succeeded"),
        }
        Ok(outcome)
    }

    /// Close the transport. The session ends with it.
    pub async fn close(&mut self) -> Result<()> {
        tracing::info!(server = %self.name, "shutting down MCP client");
        self.session.initialized = false;
        self.correlator.close().await
    }
}
