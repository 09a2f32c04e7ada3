//! Configuration system for the Quill MCP client.
//!
//! Provides TOML-based configuration with:
//! - Named MCP servers (`[[servers]]`) over stdio or HTTP
//! - Handshake, discovery and call timeouts (`[timeouts]`)
//! - Debug-dump markers for the response decoder (`[decoder]`)
//! - Config file layering (user config + project-local overrides)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    load_config, load_config_file, load_config_with_options, xdg_config_dir, xdg_config_path,
    ConfigSource, LoadedConfig,
};
pub use error::{ConfigError, Result};
pub use types::*;
