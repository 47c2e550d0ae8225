//! Persisted player state under the app data directory.
//!
//! `config.json` is written state, not layered configuration: the setup
//! flow writes it once and every later start reads it back.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::Result;

/// Fixed loopback port for the local media server.
pub const MEDIA_SERVER_PORT: u16 = 8763;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub server_url: String,
    pub access_code: Option<String>,
    pub device_name: Option<String>,
    pub fullscreen: bool,
    pub debug: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            access_code: None,
            device_name: None,
            fullscreen: true,
            debug: false,
        }
    }
}

impl PlayerConfig {
    /// True once the setup flow has completed.
    #[must_use]
    pub fn is_enrolled(&self) -> bool {
        !self.server_url.is_empty() && self.access_code.is_some()
    }

    /// Read the config file, falling back to defaults when it is missing.
    /// A corrupt file is logged and treated as missing; the player still
    /// renders the splash.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(config) => config,
                Err(e) => {
                    error!("Corrupt config file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// Filesystem layout under the app data directory.
#[derive(Debug, Clone)]
pub struct PlayerPaths {
    data_dir: PathBuf,
}

impl PlayerPaths {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = PlayerConfig {
            server_url: "http://10.0.0.5:8000".to_string(),
            access_code: Some("004211".to_string()),
            device_name: Some("lobby".to_string()),
            fullscreen: false,
            debug: true,
        };
        config.save(&path).unwrap();

        let loaded = PlayerConfig::load(&path);
        assert_eq!(loaded.server_url, config.server_url);
        assert_eq!(loaded.access_code.as_deref(), Some("004211"));
        assert!(loaded.is_enrolled());
    }

    #[test]
    fn test_missing_file_is_defaults() {
        let config = PlayerConfig::load(Path::new("/nonexistent/config.json"));
        assert!(!config.is_enrolled());
        assert!(config.fullscreen);
    }

    #[test]
    fn test_corrupt_file_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let config = PlayerConfig::load(&path);
        assert!(!config.is_enrolled());
    }
}
