//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `~/.config/quill/config.toml` (user config)
//! 2. `./quill.toml` (project-local)
//! 3. An explicit `--config` file and CLI flags (handled by the binary)

use std::path::{Path, PathBuf};

use crate::{ConfigError, QuillConfig, Result};

/// Project-local config filename.
const PROJECT_CONFIG_FILE: &str = "quill.toml";

/// Config filename within the user config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for user directory resolution.
const APP_NAME: &str = "quill";

/// Environment variable that overrides the user config directory.
const CONFIG_DIR_ENV: &str = "QUILL_CONFIG_DIR";

/// Where one config layer was looked for.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the config file.
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: QuillConfig,
    /// Sources that were checked, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Problems found while loading. Never fatal.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Discover and merge the user and project config layers.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Like [`load_config`], with `config_dir` overriding both `QUILL_CONFIG_DIR`
/// and the platform default.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = QuillConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    let user_config_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => xdg_config_path(),
    };
    if let Some(path) = user_config_path {
        sources.push(load_layer(&mut config, &path, &mut warnings));
    }

    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path, &mut warnings));

    check_servers(&config, &mut warnings);

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<QuillConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    QuillConfig::from_toml(&contents)
}

/// User config file path.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// User config directory: `QUILL_CONFIG_DIR` if set, else the platform
/// config dir joined with `quill`.
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

fn load_layer(config: &mut QuillConfig, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    let mut source = ConfigSource {
        path: path.to_path_buf(),
        loaded: false,
    };
    if !path.is_file() {
        return source;
    }

    match load_config_file(path) {
        Ok(layer) => {
            config.merge(layer);
            source.loaded = true;
        }
        Err(e) => warnings.push(format!("Failed to load {}: {}", path.display(), e)),
    }
    source
}

/// Enabled servers that cannot be connected are reported, not rejected.
fn check_servers(config: &QuillConfig, warnings: &mut Vec<String>) {
    for server in config.enabled_servers() {
        if let Err(e) = server.validate() {
            warnings.push(e.to_string());
        }
    }
}
