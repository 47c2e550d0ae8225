//! Typed HTTP client for the control server.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use signcast_core::models::display::SlideshowTransition;
use signcast_core::models::{BackgroundMode, LogoPosition, Orientation, Transition};

use crate::{PlayerError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// `GET /discover`
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverInfo {
    pub name: String,
    pub version: String,
    pub ip: String,
    pub port: u16,
}

/// `POST /player/register`
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterReply {
    pub success: bool,
    pub device_name: String,
    pub device_id: i64,
}

/// One playlist entry as served to the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub id: i64,
    pub name: String,
    pub filename: String,
    pub file_type: String,
    pub file_size: u64,
    pub display_duration: f64,
    /// Intrinsic video duration when the server knows it.
    #[serde(default)]
    pub duration: Option<f64>,
    pub url: String,
    pub order: i32,
}

impl PlaylistItem {
    #[must_use]
    pub fn is_video(&self) -> bool {
        self.file_type == "video"
    }

    /// Intrinsic duration for videos when known, else `display_duration`.
    #[must_use]
    pub fn effective_duration(&self) -> f64 {
        if self.is_video() {
            self.duration.unwrap_or(self.display_duration)
        } else {
            self.display_duration
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SyncInfo {
    /// Seconds since epoch at which cycle position zero is defined.
    pub start_time: f64,
    pub total_duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct OrientationSettings {
    pub orientation: Orientation,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

/// `GET /player/{code}/playlist`: the fields the engine consumes. The
/// debug block is operator tooling and is ignored here.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistFetch {
    pub playlist: Vec<PlaylistItem>,
    pub device: OrientationSettings,
    pub transition: Transition,
    pub sync: SyncInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackgroundInfo {
    pub filename: String,
    pub url: String,
    pub order: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefaultDisplayInfo {
    pub logo_filename: Option<String>,
    pub logo_url: Option<String>,
    pub logo_scale: f64,
    pub logo_position: LogoPosition,
    pub background_mode: BackgroundMode,
    pub background_color: String,
    pub background_video: Option<String>,
    pub background_video_url: Option<String>,
    pub slideshow_duration: f64,
    pub slideshow_transition: SlideshowTransition,
    pub backgrounds: Vec<BackgroundInfo>,
}

/// `GET /player/{code}/config`
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfigFetch {
    pub default_display: DefaultDisplayInfo,
    pub server_time: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorBody {
    error: String,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    downloader: reqwest::Client,
    base: String,
}

impl ApiClient {
    pub fn new(server_url: &str) -> Result<Self> {
        let base = server_url.trim_end_matches('/').to_string();
        if url::Url::parse(&base).is_err() {
            return Err(PlayerError::Config(format!(
                "Invalid server URL: {server_url:?}"
            )));
        }
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()?,
            downloader: reqwest::Client::builder()
                .timeout(DOWNLOAD_TIMEOUT)
                .build()?,
            base,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Absolute form of a server-relative URL like `/uploads/content/x.mp4`.
    #[must_use]
    pub fn absolute_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base, path)
        }
    }

    pub async fn discover(&self) -> Result<DiscoverInfo> {
        self.get_json("/discover").await
    }

    /// Server wall-clock in seconds since epoch.
    pub async fn server_time(&self) -> Result<f64> {
        #[derive(Deserialize)]
        struct TimeBody {
            time: f64,
        }
        let body: TimeBody = self.get_json("/time").await?;
        Ok(body.time)
    }

    pub async fn register(&self, access_code: &str) -> Result<RegisterReply> {
        let response = self
            .http
            .post(format!("{}/player/register", self.base))
            .form(&[("access_code", access_code)])
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn playlist(&self, access_code: &str) -> Result<PlaylistFetch> {
        self.get_json(&format!("/player/{access_code}/playlist")).await
    }

    pub async fn device_config(&self, access_code: &str) -> Result<DeviceConfigFetch> {
        self.get_json(&format!("/player/{access_code}/config")).await
    }

    /// Stream a media file to `dest`. The caller owns atomicity (temp file
    /// plus rename); this writes to the exact path given.
    pub async fn download(&self, path: &str, dest: &Path) -> Result<u64> {
        let url = self.absolute_url(path);
        let mut response = self.downloader.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(PlayerError::Api {
                status: response.status().as_u16(),
                message: format!("Download failed for {url}"),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.http.get(format!("{}{}", self.base, path)).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let message = response
            .json::<ApiErrorBody>()
            .await
            .map_or_else(|_| status.to_string(), |body| body.error);
        Err(PlayerError::Api {
            status: status.as_u16(),
            message,
        })
    }
}
