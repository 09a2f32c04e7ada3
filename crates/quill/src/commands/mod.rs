//! CLI command handlers.

pub mod call;
pub mod tools;

use std::time::Duration;

use anyhow::{Context as _, Result, bail};

use quill_config::{FramingKind, QuillConfig, ServerEntry, TransportKind};
use quill_mcp::{ClientInfo, ClientOptions, DynClient, Framing, McpClient, McpServerConfig};

use crate::Cli;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Server to connect to.
    pub server: McpServerConfig,
    /// Client settings.
    pub options: ClientOptions,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Pick the target server and client settings from flags and config.
    ///
    /// `--stdio` and `--url` win over configured servers. Otherwise `--server`
    /// names one, or the only enabled server is used.
    pub fn resolve(cli: &Cli, config: &QuillConfig) -> Result<Self> {
        let server = match (&cli.stdio, &cli.url) {
            (Some(command), _) => {
                let Some((program, args)) = command.split_first() else {
                    bail!("--stdio needs a command");
                };
                let framing = if cli.content_length {
                    Framing::ContentLength
                } else {
                    Framing::Newline
                };
                McpServerConfig::new("stdio", program)
                    .with_args(args.to_vec())
                    .with_framing(framing)
            }
            (None, Some(url)) => McpServerConfig::http("http", url),
            (None, None) => server_config(select_server(config, cli.server.as_deref())?)?,
        };

        let mut options = client_options(config);
        if let Some(secs) = cli.call_timeout {
            options = options.with_call_timeout(Some(Duration::from_secs(secs)));
        }

        Ok(Self {
            server,
            options,
            json_output: cli.json,
            verbose: cli.verbose || cli.debug,
        })
    }

    /// Open the transport and run the handshake and tool discovery.
    pub async fn connect(&self) -> Result<DynClient> {
        let mut client = McpClient::connect(&self.server, self.options.clone())
            .with_context(|| format!("connecting to '{}'", self.server.name))?;
        client
            .bootstrap()
            .await
            .with_context(|| format!("initializing '{}'", self.server.name))?;
        Ok(client)
    }
}

fn select_server<'a>(config: &'a QuillConfig, name: Option<&str>) -> Result<&'a ServerEntry> {
    if let Some(name) = name {
        return Ok(config.server(name)?);
    }

    let enabled: Vec<&ServerEntry> = config.enabled_servers().collect();
    match enabled.as_slice() {
        [only] => Ok(*only),
        [] => bail!(
            "no server to talk to: pass --stdio CMD, --url URL, or add a [[servers]] entry to quill.toml"
        ),
        many => {
            let names: Vec<&str> = many.iter().map(|s| s.name.as_str()).collect();
            bail!(
                "several servers are configured ({}); pick one with --server",
                names.join(", ")
            )
        }
    }
}

/// Convert a [`ServerEntry`] to an [`McpServerConfig`].
fn server_config(entry: &ServerEntry) -> Result<McpServerConfig> {
    entry.validate()?;

    if entry.transport == TransportKind::Http {
        let url = entry.url.as_deref().unwrap_or_default();
        let mut config = McpServerConfig::http(&entry.name, url);
        for (key, value) in entry.header_tuples() {
            config = config.with_header(key, value);
        }
        if let Some(timeout) = entry.timeout_secs {
            config = config.with_timeout(Duration::from_secs(timeout));
        }
        if let Some(retries) = entry.retries {
            config = config.with_retries(retries);
        }
        return Ok(config);
    }

    let framing = match entry.framing {
        FramingKind::Newline => Framing::Newline,
        FramingKind::ContentLength => Framing::ContentLength,
    };
    let mut config = McpServerConfig::new(&entry.name, &entry.command)
        .with_args(entry.args.clone())
        .with_framing(framing);
    for (key, value) in entry.env_tuples() {
        config = config.with_env_var(key, value);
    }
    Ok(config)
}

fn client_options(config: &QuillConfig) -> ClientOptions {
    let timeouts = config.timeouts();
    let mut options = ClientOptions::default()
        .with_handshake_timeout(Some(timeouts.handshake()))
        .with_discovery_timeout(Some(timeouts.discovery()))
        .with_call_timeout(timeouts.call())
        .with_markers(config.decoder().markers);

    if let Some(client) = &config.client {
        let defaults = ClientInfo::default();
        options.client_info = ClientInfo {
            name: client.name.clone().unwrap_or(defaults.name),
            version: client.version.clone().unwrap_or(defaults.version),
        };
        if let Some(version) = &client.protocol_version {
            options.protocol_version = version.clone();
        }
    }
    options
}
