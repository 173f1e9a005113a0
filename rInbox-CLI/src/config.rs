//! Configuration management for the inbox CLI.

use anyhow::{Context, Result};
use rinbox::{InboxSession, Role, SessionConfig};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::storage::FileStorage;

/// CLI configuration.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Signed-in viewer.
    pub viewer: Option<ViewerConfig>,
    /// Storage file; defaults to `rinbox-storage.json` next to the executable.
    pub storage_path: Option<PathBuf>,
    /// Session tunables.
    #[serde(default)]
    pub session: SessionConfig,
}

/// Viewer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Role label, `client` or `service_provider`.
    pub role: String,
    /// User ID.
    pub viewer_id: i64,
}

impl ViewerConfig {
    /// Parsed role.
    pub fn role(&self) -> Result<Role> {
        Role::from_label(&self.role).with_context(|| format!("Unknown role '{}'", self.role))
    }
}

fn exe_dir() -> Result<PathBuf> {
    let exe_path = env::current_exe().context("Could not determine executable path")?;
    let exe_dir = exe_path
        .parent()
        .context("Could not determine executable directory")?;

    Ok(exe_dir.to_path_buf())
}

/// Get the configuration file path.
pub fn config_path() -> Result<PathBuf> {
    Ok(exe_dir()?.join("rinbox.toml"))
}

/// Get the storage file path.
pub fn storage_path(config: &Config) -> Result<PathBuf> {
    match &config.storage_path {
        Some(path) => Ok(path.clone()),
        None => Ok(exe_dir()?.join("rinbox-storage.json")),
    }
}

/// Load configuration from file.
pub fn load_config() -> Result<Config> {
    let path = config_path()?;

    if !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path).context("Failed to read config file")?;

    toml::from_str(&content).context("Failed to parse config file")
}

/// Save configuration to file.
pub fn save_config(config: &Config) -> Result<()> {
    let path = config_path()?;
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;

    fs::write(&path, content).context("Failed to write config file")?;

    Ok(())
}

/// Build an in-memory session for the configured viewer.
pub fn build_memory_session() -> Result<InboxSession> {
    let config = load_config()?;
    let viewer = require_viewer(&config)?;

    InboxSession::builder()
        .viewer(viewer.role()?, viewer.viewer_id)
        .config(config.session)
        .build()
        .context("Failed to build inbox session")
}

/// Build a session backed by the storage file, with its thread list loaded.
pub fn build_session() -> Result<InboxSession> {
    let config = load_config()?;
    let viewer = require_viewer(&config)?;
    let storage = FileStorage::open(storage_path(&config)?);
    tracing::debug!("using storage {}", storage.path().display());

    let mut session = InboxSession::builder()
        .viewer(viewer.role()?, viewer.viewer_id)
        .storage(Arc::new(storage))
        .config(config.session)
        .build()
        .context("Failed to build inbox session")?;

    if !session.hydrate() {
        tracing::debug!("no cached threads for {}", session.scope());
    }
    Ok(session)
}

fn require_viewer(config: &Config) -> Result<ViewerConfig> {
    config
        .viewer
        .clone()
        .context("No viewer configured. Run 'rinbox viewer set' first.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_config() {
        let config: Config = toml::from_str(
            r#"
            storage_path = "/tmp/inbox.json"

            [viewer]
            role = "artist"
            viewer_id = 7

            [session]
            stub_capacity = 4
            "#,
        )
        .unwrap();

        let viewer = config.viewer.unwrap();
        assert_eq!(viewer.role().unwrap(), Role::ServiceProvider);
        assert_eq!(viewer.viewer_id, 7);
        assert_eq!(config.session.stub_capacity, 4);
        assert_eq!(config.session.max_cached_threads, 50);
    }

    #[test]
    fn test_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.viewer.is_none());
        assert_eq!(config.session, SessionConfig::default());
    }

    #[test]
    fn test_unknown_role() {
        let viewer = ViewerConfig {
            role: "admin".into(),
            viewer_id: 1,
        };
        assert!(viewer.role().is_err());
    }
}
