//! Quill - command-line client for MCP tool servers
//!
//! Main entry point for the Quill CLI.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use quill_config::LoggingConfig;

mod commands;

use commands::{call, tools};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Quill - command-line client for MCP tool servers
#[derive(Parser)]
#[command(name = "quill")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file to load on top of the discovered layers
    #[arg(long, global = true, env = "QUILL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Name of a configured server to talk to
    #[arg(long, short, global = true)]
    pub server: Option<String>,

    /// Spawn this command and talk to it over stdio. Takes the rest of the
    /// command line, so it goes last: `quill tools --stdio server --flag`
    #[arg(long, global = true, num_args = 1.., allow_hyphen_values = true, value_name = "CMD", conflicts_with = "url")]
    pub stdio: Option<Vec<String>>,

    /// Use Content-Length framing with --stdio
    #[arg(long, global = true, requires = "stdio")]
    pub content_length: bool,

    /// Streamable-HTTP endpoint of the server
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Seconds to wait for a tool call reply (default: forever)
    #[arg(long, global = true, value_name = "SECS")]
    pub call_timeout: Option<u64>,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log raw protocol traffic
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the tools a server offers
    Tools(tools::ToolsArgs),

    /// Invoke a tool
    Call(call::CallArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = quill_config::load_config(None)?;
    let mut config = loaded.config;
    if let Some(path) = &cli.config {
        let explicit = quill_config::load_config_file(path)
            .with_context(|| format!("loading {}", path.display()))?;
        config.merge(explicit);
    }

    let _guard = init_tracing(&cli, &config.logging());
    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }
    tracing::debug!(sources = ?loaded.sources, "config loaded");

    let ctx = commands::Context::resolve(&cli, &config)?;

    match cli.command {
        Commands::Tools(args) => tools::run(args, &ctx).await,
        Commands::Call(args) => call::run(args, &ctx).await,
    }
}

/// Console layer on stderr plus an optional daily-rotated JSON file layer.
///
/// `RUST_LOG` overrides the console filter.
fn init_tracing(cli: &Cli, logging: &LoggingConfig) -> Option<WorkerGuard> {
    let default_filter = if cli.debug {
        "quill=debug,quill_mcp=trace,quill_config=debug,info"
    } else if cli.verbose {
        "quill=debug,quill_mcp=debug,quill_config=debug,info"
    } else {
        logging.level.as_deref().unwrap_or("quill=info,warn")
    };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let (file_layer, guard) = match &logging.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "quill.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(EnvFilter::new(
                    "quill=trace,quill_mcp=trace,quill_config=trace,info",
                ));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(file_layer)
        .init();

    guard
}
