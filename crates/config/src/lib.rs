//! Configuration loading for helpdesk services
//!
//! Provides utilities for loading configuration files from the shared
//! helpdesk config directory (~/.config/helpdesk/).
//!
//! Call [`init`] at service startup to bootstrap the config directory.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Initialize the helpdesk config directory.
///
/// Creates ~/.config/helpdesk/ if it doesn't exist.
/// Call this once at service startup.
pub fn init() -> Result<PathBuf> {
    ensure_config_dir()
}

/// Get the helpdesk config directory.
///
/// `HELPDESK_CONFIG_DIR` overrides the default of ~/.config/helpdesk/ so
/// deployments can mount configuration at a fixed path.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("HELPDESK_CONFIG_DIR")
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|p| p.join("helpdesk"))
}

/// Get the path to a config file within the helpdesk config directory
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(filename))
}

/// Load and parse a JSON config file from the helpdesk config directory
pub fn load_json<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let path = config_path(filename).context("Could not determine config directory")?;
    load_json_file(&path)
}

/// Load and parse a JSON file from an arbitrary path
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Check if a config file exists in the helpdesk config directory
pub fn config_exists(filename: &str) -> bool {
    config_path(filename).is_some_and(|p| p.exists())
}

/// Ensure the helpdesk config directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir().context("Could not determine config directory")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    Ok(dir)
}
