//! Multi-server lifecycle management.
//!
//! [`McpManager`] keeps several independent sessions side by side. Servers
//! are bootstrapped concurrently, one task each; after that every session is
//! driven on its own and shares nothing with the others.
//!
//! # Example
//!
//! ```rust,ignore
//! use quill_mcp::{ClientOptions, McpManager, McpServerConfig};
//!
//! let mut manager = McpManager::new(ClientOptions::default());
//! manager.add_server(McpServerConfig::new("db", "db-tools-server"));
//!
//! let summary = manager.connect_all().await;
//! for (name, err) in &summary.failed {
//!     eprintln!("{name}: {err}");
//! }
//!
//! let outcome = manager.call_tool("db", "list_tables", json!({})).await?;
//! manager.shutdown_all().await;
//! ```

use std::collections::HashMap;

use serde_json::Value;
use tokio::task::JoinSet;

use crate::client::{CallOutcome, ClientOptions, McpClient, McpServerConfig};
use crate::error::{McpError, Result};
use crate::protocol::ToolInfo;
use crate::transport::Transport;

/// A client over whichever transport its config selected.
pub type DynClient = McpClient<Box<dyn Transport>>;

/// Result of [`McpManager::connect_all`].
#[derive(Debug, Default)]
pub struct ConnectSummary {
    /// Servers that completed bootstrap.
    pub connected: Vec<String>,
    /// Servers that failed, with the reason.
    pub failed: Vec<(String, McpError)>,
}

/// Manager for multiple MCP server connections.
pub struct McpManager {
    options: ClientOptions,
    configs: HashMap<String, McpServerConfig>,
    clients: HashMap<String, DynClient>,
}

impl McpManager {
    /// Create a new empty manager.
    pub fn new(options: ClientOptions) -> Self {
        Self {
            options,
            configs: HashMap::new(),
            clients: HashMap::new(),
        }
    }

    /// Create a manager with the given server configurations.
    pub fn with_configs(options: ClientOptions, configs: Vec<McpServerConfig>) -> Self {
        let mut manager = Self::new(options);
        for config in configs {
            manager.add_server(config);
        }
        manager
    }

    /// Add a server configuration, replacing one with the same name.
    ///
    /// The server will not be connected until [`McpManager::connect_all`] is called.
    pub fn add_server(&mut self, config: McpServerConfig) {
        tracing::debug!(server = %config.name, "adding MCP server configuration");
        self.configs.insert(config.name.clone(), config);
    }

    /// Adopt an already built client, e.g. one over a custom transport.
    pub fn add_client(&mut self, client: DynClient) {
        let name = client.name().to_string();
        tracing::debug!(server = %name, "adopting MCP client");
        self.clients.insert(name, client);
    }

    /// Remove a server, closing its session if connected.
    ///
    /// Returns true if the server was known.
    pub async fn remove_server(&mut self, name: &str) -> bool {
        let was_connected = self.shutdown_server(name).await;
        let was_configured = self.configs.remove(name).is_some();
        was_connected || was_configured
    }

    /// Names of all configured servers, sorted.
    pub fn server_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.configs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Names of all connected servers, sorted.
    pub fn connected_server_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.clients.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Check if a server is configured.
    pub fn has_server(&self, name: &str) -> bool {
        self.configs.contains_key(name)
    }

    /// Check if a server is connected.
    pub fn is_connected(&self, name: &str) -> bool {
        self.clients.contains_key(name)
    }

    /// A connected client by name.
    pub fn client(&self, name: &str) -> Option<&DynClient> {
        self.clients.get(name)
    }

    /// A connected client by name, for driving it directly.
    pub fn client_mut(&mut self, name: &str) -> Option<&mut DynClient> {
        self.clients.get_mut(name)
    }

    /// Connect and bootstrap every configured server that is not connected yet.
    ///
    /// Servers are bootstrapped concurrently. Failures are collected per
    /// server and never abort the others.
    pub async fn connect_all(&mut self) -> ConnectSummary {
        let mut tasks = JoinSet::new();
        for (name, config) in &self.configs {
            if self.clients.contains_key(name) {
                tracing::debug!(server = %name, "server already connected, skipping");
                continue;
            }
            let config = config.clone();
            let options = self.options.clone();
            tasks.spawn(async move {
                let result = bootstrap(&config, options).await;
                (config.name, result)
            });
        }

        let mut summary = ConnectSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(client))) => {
                    tracing::info!(server = %name, tools = client.available_tools().len(), "MCP server connected");
                    self.clients.insert(name.clone(), client);
                    summary.connected.push(name);
                }
                Ok((name, Err(e))) => {
                    tracing::error!(server = %name, error = %e, "failed to connect to MCP server");
                    summary.failed.push((name, e));
                }
                Err(e) => {
                    tracing::error!(error = %e, "MCP bootstrap task failed");
                }
            }
        }
        summary.connected.sort();
        summary.failed.sort_by(|a, b| a.0.cmp(&b.0));

        tracing::info!(
            connected = summary.connected.len(),
            failed = summary.failed.len(),
            total = self.configs.len(),
            "MCP server connection complete"
        );
        summary
    }

    /// Connect a single server by name.
    ///
    /// If the server is already connected, returns Ok without reconnecting.
    pub async fn connect_server(&mut self, name: &str) -> Result<()> {
        if self.clients.contains_key(name) {
            return Ok(());
        }
        let config = self
            .configs
            .get(name)
            .ok_or_else(|| McpError::UnknownServer(name.to_string()))?;
        let client = bootstrap(config, self.options.clone()).await?;
        self.clients.insert(name.to_string(), client);
        tracing::info!(server = %name, "MCP server connected");
        Ok(())
    }

    /// Call a tool on a connected server.
    pub async fn call_tool(
        &mut self,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<CallOutcome> {
        let client = self
            .clients
            .get_mut(server)
            .ok_or_else(|| McpError::UnknownServer(server.to_string()))?;
        client.call_tool(tool, arguments).await
    }

    /// Every discovered tool, paired with its server name.
    pub fn all_tools(&self) -> Vec<(&str, &ToolInfo)> {
        let mut tools: Vec<(&str, &ToolInfo)> = self
            .clients
            .iter()
            .flat_map(|(name, client)| {
                client
                    .available_tools()
                    .iter()
                    .map(move |tool| (name.as_str(), tool))
            })
            .collect();
        tools.sort_by(|a, b| (a.0, &a.1.name).cmp(&(b.0, &b.1.name)));
        tools
    }

    /// Total number of discovered tools across all servers.
    pub fn tool_count(&self) -> usize {
        self.clients
            .values()
            .map(|c| c.available_tools().len())
            .sum()
    }

    /// Close every session. Configurations are kept for reconnection.
    pub async fn shutdown_all(&mut self) {
        tracing::info!(
            server_count = self.clients.len(),
            "shutting down all MCP servers"
        );
        for (name, mut client) in self.clients.drain() {
            if let Err(e) = client.close().await {
                tracing::warn!(server = %name, error = %e, "error closing MCP server");
            }
        }
    }

    /// Close one session.
    ///
    /// Returns true if the server was connected and is now disconnected.
    pub async fn shutdown_server(&mut self, name: &str) -> bool {
        let Some(mut client) = self.clients.remove(name) else {
            return false;
        };
        tracing::info!(server = %name, "shutting down MCP server");
        if let Err(e) = client.close().await {
            tracing::warn!(server = %name, error = %e, "error closing MCP server");
        }
        true
    }

    /// Get the number of configured servers.
    pub fn config_count(&self) -> usize {
        self.configs.len()
    }

    /// Get the number of connected servers.
    pub fn connected_count(&self) -> usize {
        self.clients.len()
    }
}

async fn bootstrap(config: &McpServerConfig, options: ClientOptions) -> Result<DynClient> {
    let mut client = McpClient::connect(config, options)?;
    client.bootstrap().await?;
    Ok(client)
}

impl std::fmt::Debug for McpManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpManager")
            .field("configured", &self.server_names())
            .field("connected", &self.connected_server_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;
    use crate::wire::WireValue;
    use serde_json::json;

    fn manager() -> McpManager {
        McpManager::new(ClientOptions::default())
    }

    /// A client whose peer answers every request from a canned table.
    fn scripted_client(name: &str, tool: &str) -> DynClient {
        let (transport, mut peer) = ChannelTransport::pair();
        let tool = tool.to_string();
        tokio::spawn(async move {
            while let Some(envelope) = peer.next_request().await {
                let Some(id) = envelope.id.clone() else { continue };
                let result = match envelope.method.as_str() {
                    "initialize" => json!({"serverInfo": {"name": "scripted"}}),
                    "tools/list" => json!({"tools": [{"name": tool}]}),
                    _ => json!({"content": [{"type": "text", "text": format!("{tool} ran")}]}),
                };
                peer.reply(WireValue::Structured(json!({"id": id, "result": result})));
            }
        });
        McpClient::new(name, Box::new(transport) as Box<dyn Transport>, ClientOptions::default())
    }

    #[test]
    fn test_new_manager_empty() {
        let manager = manager();
        assert_eq!(manager.config_count(), 0);
        assert_eq!(manager.connected_count(), 0);
    }

    #[test]
    fn test_with_configs() {
        let configs = vec![
            McpServerConfig::new("server1", "cmd1"),
            McpServerConfig::new("server2", "cmd2"),
        ];
        let manager = McpManager::with_configs(ClientOptions::default(), configs);
        assert_eq!(manager.server_names(), ["server1", "server2"]);
        assert!(!manager.has_server("server3"));
    }

    #[tokio::test]
    async fn test_remove_server() {
        let mut manager = manager();
        manager.add_server(McpServerConfig::new("test", "cmd"));
        assert!(manager.remove_server("test").await);
        assert!(!manager.has_server("test"));
        assert!(!manager.remove_server("nonexistent").await);
    }

    #[tokio::test]
    async fn test_connect_all_no_servers() {
        let summary = manager().connect_all().await;
        assert!(summary.connected.is_empty());
        assert!(summary.failed.is_empty());
    }

    #[tokio::test]
    async fn test_connect_all_collects_failures() {
        let mut manager = manager();
        manager.add_server(McpServerConfig::new("invalid", "nonexistent-command-12345"));
        manager.add_server(McpServerConfig::new("empty", ""));

        let summary = manager.connect_all().await;
        assert!(summary.connected.is_empty());
        let failed: Vec<&str> = summary.failed.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(failed, ["empty", "invalid"]);
        assert!(matches!(summary.failed[0].1, McpError::InvalidConfig(_)));
        assert!(matches!(summary.failed[1].1, McpError::SpawnFailed(_)));
        assert!(!manager.is_connected("invalid"));
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let mut manager = manager();
        for (name, tool) in [("alpha", "ping"), ("beta", "pong")] {
            let mut client = scripted_client(name, tool);
            client.bootstrap().await.unwrap();
            manager.add_client(client);
        }

        assert_eq!(manager.connected_server_names(), ["alpha", "beta"]);
        assert_eq!(manager.tool_count(), 2);
        let tools: Vec<(&str, &str)> = manager
            .all_tools()
            .into_iter()
            .map(|(s, t)| (s, t.name.as_str()))
            .collect();
        assert_eq!(tools, [("alpha", "ping"), ("beta", "pong")]);

        let outcome = manager.call_tool("beta", "pong", json!({})).await.unwrap();
        assert_eq!(outcome.text(), Some("pong ran"));

        manager.shutdown_all().await;
        assert_eq!(manager.connected_count(), 0);
    }

    #[tokio::test]
    async fn test_call_unknown_server() {
        let mut manager = manager();
        let err = manager.call_tool("ghost", "x", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::UnknownServer(ref n) if n == "ghost"));
    }

    #[tokio::test]
    async fn test_connect_server_not_configured() {
        let mut manager = manager();
        assert!(matches!(
            manager.connect_server("missing").await,
            Err(McpError::UnknownServer(_))
        ));
    }

    #[test]
    fn test_debug_format() {
        let mut manager = manager();
        manager.add_server(McpServerConfig::new("test", "cmd"));
        let debug = format!("{:?}", manager);
        assert!(debug.contains("McpManager"));
        assert!(debug.contains("test"));
    }

    #[tokio::test]
    async fn test_shutdown_server_not_connected() {
        let mut manager = manager();
        manager.add_server(McpServerConfig::new("test", "cmd"));
        assert!(!manager.shutdown_server("test").await);
        assert!(manager.has_server("test"));
    }
}
