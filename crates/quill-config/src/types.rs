//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [client]                 # identity sent in the handshake
//! [timeouts]               # reply wait bounds
//! [decoder]                # debug-dump markers
//! [logging]                # log level and optional JSON log directory
//! [[servers]]              # named MCP servers
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuillConfig {
    /// Client identity.
    pub client: Option<ClientSection>,
    /// Reply wait bounds.
    pub timeouts: Option<TimeoutsConfig>,
    /// Response decoder settings.
    pub decoder: Option<DecoderConfig>,
    /// Logging settings.
    pub logging: Option<LoggingConfig>,
    /// Configured MCP servers.
    pub servers: Vec<ServerEntry>,
}

impl QuillConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced whole. Servers are matched by name: a server in
    /// `other` replaces the one with the same name, new names are appended.
    pub fn merge(&mut self, other: QuillConfig) {
        if other.client.is_some() {
            self.client = other.client;
        }
        if other.timeouts.is_some() {
            self.timeouts = other.timeouts;
        }
        if other.decoder.is_some() {
            self.decoder = other.decoder;
        }
        if other.logging.is_some() {
            self.logging = other.logging;
        }
        for server in other.servers {
            match self.servers.iter_mut().find(|s| s.name == server.name) {
                Some(existing) => *existing = server,
                None => self.servers.push(server),
            }
        }
    }

    /// Timeouts, falling back to defaults.
    pub fn timeouts(&self) -> TimeoutsConfig {
        self.timeouts.clone().unwrap_or_default()
    }

    /// Decoder settings, falling back to defaults.
    pub fn decoder(&self) -> DecoderConfig {
        self.decoder.clone().unwrap_or_default()
    }

    /// Logging settings, falling back to defaults.
    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Look up a server by name.
    pub fn server(&self, name: &str) -> Result<&ServerEntry> {
        self.servers
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ConfigError::ServerNotFound(name.to_string()))
    }

    /// Servers that are enabled.
    pub fn enabled_servers(&self) -> impl Iterator<Item = &ServerEntry> {
        self.servers.iter().filter(|s| s.enabled)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// `[client]`: overrides for the identity sent in the handshake.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    /// Client name.
    pub name: Option<String>,
    /// Client version.
    pub version: Option<String>,
    /// MCP protocol version.
    pub protocol_version: Option<String>,
}

/// `[timeouts]`, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Bound on the `initialize` reply.
    pub handshake_secs: u64,
    /// Bound on the `tools/list` reply.
    pub discovery_secs: u64,
    /// Bound on `tools/call` replies. Unset waits forever.
    pub call_secs: Option<u64>,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            handshake_secs: 30,
            discovery_secs: 5,
            call_secs: None,
        }
    }
}

impl TimeoutsConfig {
    /// Handshake bound.
    pub fn handshake(&self) -> Duration {
        Duration::from_secs(self.handshake_secs)
    }

    /// Discovery bound.
    pub fn discovery(&self) -> Duration {
        Duration::from_secs(self.discovery_secs)
    }

    /// Call bound, if any.
    pub fn call(&self) -> Option<Duration> {
        self.call_secs.map(Duration::from_secs)
    }
}

/// `[decoder]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Prefixes that mark a reply as the debug dump of a response object.
    pub markers: Vec<String>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            markers: vec!["root=".to_string()],
        }
    }
}

/// `[logging]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (e.g. "info", "quill_mcp=debug").
    pub level: Option<String>,
    /// Directory for daily-rotated JSON log files. Unset disables file logging.
    pub directory: Option<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Servers
// ─────────────────────────────────────────────────────────────────────────────

/// Transport type for MCP server connections.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Spawn a child process and talk over its stdio.
    #[default]
    Stdio,
    /// POST to a streamable-HTTP endpoint.
    Http,
}

/// Message framing for stdio servers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FramingKind {
    /// One JSON message per line.
    #[default]
    Newline,
    /// `Content-Length` headers.
    ContentLength,
}

/// One `[[servers]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerEntry {
    /// Unique name for this server.
    pub name: String,
    /// Transport type (stdio or http). Defaults to stdio.
    #[serde(default)]
    pub transport: TransportKind,
    /// Command to execute to start the server (for stdio transport).
    #[serde(default)]
    pub command: String,
    /// Arguments to pass to the command (for stdio transport).
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables to set (as [key, value] pairs, for stdio transport).
    #[serde(default)]
    pub env: Vec<[String; 2]>,
    /// Message framing (for stdio transport).
    #[serde(default)]
    pub framing: FramingKind,
    /// URL for the server (for HTTP transport).
    pub url: Option<String>,
    /// HTTP headers to set (as [key, value] pairs, for HTTP transport).
    #[serde(default)]
    pub headers: Vec<[String; 2]>,
    /// Request timeout in seconds (for HTTP transport).
    pub timeout_secs: Option<u64>,
    /// Number of retries (for HTTP transport).
    pub retries: Option<u32>,
    /// Whether this server is enabled. Defaults to true.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ServerEntry {
    /// Create a new server entry for stdio transport.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::Stdio,
            command: command.into(),
            args: Vec::new(),
            env: Vec::new(),
            framing: FramingKind::default(),
            url: None,
            headers: Vec::new(),
            timeout_secs: None,
            retries: None,
            enabled: true,
        }
    }

    /// Create a new server entry for HTTP transport.
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            transport: TransportKind::Http,
            url: Some(url.into()),
            ..Self::new(name, String::new())
        }
    }

    /// Add an argument (for stdio transport).
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an environment variable (for stdio transport).
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push([key.into(), value.into()]);
        self
    }

    /// Add an HTTP header (for HTTP transport).
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push([key.into(), value.into()]);
        self
    }

    /// Check that the entry names what its transport needs.
    pub fn validate(&self) -> Result<()> {
        let missing = match self.transport {
            TransportKind::Stdio if self.command.trim().is_empty() => Some("command"),
            TransportKind::Http if self.url.as_deref().is_none_or(str::is_empty) => Some("url"),
            _ => None,
        };
        match missing {
            Some(field) => Err(ConfigError::MissingField {
                field: field.to_string(),
                context: format!("[[servers]] '{}'", self.name),
            }),
            None => Ok(()),
        }
    }

    /// Environment variables as tuples.
    pub fn env_tuples(&self) -> Vec<(String, String)> {
        self.env
            .iter()
            .map(|[k, v]| (k.clone(), v.clone()))
            .collect()
    }

    /// HTTP headers as tuples.
    pub fn header_tuples(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .map(|[k, v]| (k.clone(), v.clone()))
            .collect()
    }
}
