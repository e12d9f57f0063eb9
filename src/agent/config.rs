//! Persisted agent settings (`config/devsetup-config.json`).
//!
//! The file is the source of truth for which tools are installed. Loading and
//! saving never fail from the caller's point of view: a missing or corrupt
//! file means "nothing installed yet", and a failed save is only logged.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Reverse-proxy settings: the web root and the project folders mapped to
/// local hostnames.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_root: Option<String>,
    #[serde(default)]
    pub folders: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistentConfig {
    /// Tool name to installed version.
    #[serde(default)]
    pub installed_tools: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_project_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tld: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ports: BTreeMap<String, u16>,
    #[serde(default)]
    pub proxy: ProxySettings,
    /// Keys written by other versions, preserved on save.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the config, falling back to the default on any error.
    pub async fn load(&self) -> PersistentConfig {
        match self.try_load().await {
            Ok(config) => config,
            Err(ConfigError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, starting empty", self.path.display());
                PersistentConfig::default()
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable config: {}", e);
                PersistentConfig::default()
            }
        }
    }

    pub async fn try_load(&self) -> Result<PersistentConfig, ConfigError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| ConfigError::Io {
                path: self.path.clone(),
                source,
            })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Save the config; failures are logged and swallowed.
    pub async fn save(&self, config: &PersistentConfig) {
        if let Err(e) = self.try_save(config).await {
            tracing::error!("Failed to save config: {}", e);
        }
    }

    /// Pretty-printed (two-space indent) write through a sibling temp file.
    pub async fn try_save(&self, config: &PersistentConfig) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let content = serde_json::to_string_pretty(config)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}
