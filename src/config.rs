//! Configuration persistence for the QuizWhiz CLI.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::reconcile::ImportMode;
use crate::remote::DirectoryRemoteStore;
use crate::storage::{FileCache, DEFAULT_CACHE_TTL_HOURS};

/// Application configuration that persists between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Local cache directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Directory backing the remote store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_dir: Option<PathBuf>,

    #[serde(default = "default_ttl")]
    pub cache_ttl_hours: u64,

    #[serde(default)]
    pub default_mode: ImportMode,

    /// User restored as signed in on startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_in_user: Option<String>,
}

fn default_ttl() -> u64 {
    DEFAULT_CACHE_TTL_HOURS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            remote_dir: None,
            cache_ttl_hours: default_ttl(),
            default_mode: ImportMode::default(),
            signed_in_user: None,
        }
    }
}

impl Config {
    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quizwhiz")
            .join("config.toml")
    }

    /// Load config from disk, returning default if file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(FileCache::default_path)
    }

    pub fn remote_dir(&self) -> PathBuf {
        self.remote_dir.clone().unwrap_or_else(DirectoryRemoteStore::default_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.cache_ttl_hours, 24);
        assert_eq!(config.default_mode, ImportMode::Merge);
    }

    #[test]
    fn save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            remote_dir: Some(dir.path().join("remote")),
            default_mode: ImportMode::Replace,
            signed_in_user: Some("u1".into()),
            ..Default::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "default_mode = \"replace\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.default_mode, ImportMode::Replace);
        assert_eq!(config.cache_ttl_hours, DEFAULT_CACHE_TTL_HOURS);
        assert!(config.signed_in_user.is_none());
    }
}
