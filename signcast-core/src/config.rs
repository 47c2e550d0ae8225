use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration for the control server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
    /// Display name announced on `/discover`.
    pub name: String,
    /// Root for `uploads/{content,logos,backgrounds}`.
    pub upload_dir: PathBuf,
    /// Root for server-side persisted state (sync origins).
    pub data_dir: PathBuf,
    /// Per-IP request budget for `POST /player/register` over a one-minute
    /// window. 0 disables the limit.
    pub register_rate_per_minute: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8000,
            name: "Signcast Server".to_string(),
            upload_dir: PathBuf::from("./uploads"),
            data_dir: PathBuf::from("./data"),
            register_rate_per_minute: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" for development, "json" for production.
    pub format: String,
    pub file_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration with precedence: environment variables over the
    /// optional config file over built-in defaults.
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, config::FileFormat::Toml));
            }
        }

        // SIGNCAST_SERVER_HTTP_PORT, SIGNCAST_LOGGING_LEVEL, ...
        builder = builder.add_source(
            Environment::with_prefix("SIGNCAST")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }

    #[must_use]
    pub fn content_dir(&self) -> PathBuf {
        self.server.upload_dir.join("content")
    }

    #[must_use]
    pub fn logos_dir(&self) -> PathBuf {
        self.server.upload_dir.join("logos")
    }

    #[must_use]
    pub fn backgrounds_dir(&self) -> PathBuf {
        self.server.upload_dir.join("backgrounds")
    }
}
