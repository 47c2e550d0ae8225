//! Content-addressed on-disk cache with a JSON manifest.
//!
//! The cache manager exclusively owns the manifest and the content
//! directory; the renderer only ever sees URLs. One `Mutex` both guards the
//! manifest and guarantees at most one sync in flight.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::Result;

/// Source of media bytes. The API client is the production implementation;
/// tests substitute their own.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Write the resource at `url` to `dest`, returning the byte count.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}

#[async_trait]
impl MediaFetcher for ApiClient {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        self.download(url, dest).await
    }
}

/// One file the current playlist (or splash config) wants on disk.
#[derive(Debug, Clone)]
pub struct WantedFile {
    pub filename: String,
    /// Expected size; `None` for splash assets, whose size the config
    /// endpoint does not report.
    pub size: Option<u64>,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub local_path: PathBuf,
    pub url: String,
    pub size: u64,
    pub synced_at: f64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    pub hits: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub evicted: usize,
}

struct CacheState {
    manifest: HashMap<String, ManifestEntry>,
}

pub struct CacheManager {
    content_dir: PathBuf,
    splash_dir: PathBuf,
    manifest_path: PathBuf,
    state: Mutex<CacheState>,
}

impl CacheManager {
    /// Open (or create) the cache under `cache_dir`.
    pub fn open(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        let content_dir = cache_dir.join("content");
        let splash_dir = cache_dir.join("splash");
        std::fs::create_dir_all(&content_dir)?;
        std::fs::create_dir_all(&splash_dir)?;

        let manifest_path = cache_dir.join("manifest.json");
        let manifest = match std::fs::read_to_string(&manifest_path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                warn!("Corrupt cache manifest, starting clean: {}", e);
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };

        Ok(Self {
            content_dir,
            splash_dir,
            manifest_path,
            state: Mutex::new(CacheState { manifest }),
        })
    }

    #[must_use]
    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }

    #[must_use]
    pub fn splash_dir(&self) -> &Path {
        &self.splash_dir
    }

    /// True if `filename` is usable from the local cache: manifest entry
    /// present, size matching (when known), bytes on disk.
    pub async fn is_cached(&self, filename: &str, expected_size: Option<u64>) -> bool {
        let state = self.state.lock().await;
        Self::hit(&state.manifest, &self.content_dir, filename, expected_size)
    }

    fn hit(
        manifest: &HashMap<String, ManifestEntry>,
        content_dir: &Path,
        filename: &str,
        expected_size: Option<u64>,
    ) -> bool {
        manifest.get(filename).is_some_and(|entry| {
            expected_size.map_or(true, |s| entry.size == s) && content_dir.join(filename).exists()
        })
    }

    /// One full sync pass over the playlist: download misses, then evict
    /// everything the playlist no longer names. Idempotent: a second pass
    /// over the same playlist downloads nothing and changes nothing.
    pub async fn sync_content(
        &self,
        wanted: &[WantedFile],
        fetcher: &dyn MediaFetcher,
    ) -> SyncOutcome {
        let mut state = self.state.lock().await;
        let mut outcome = SyncOutcome::default();

        for file in wanted {
            if Self::hit(&state.manifest, &self.content_dir, &file.filename, file.size) {
                outcome.hits += 1;
                continue;
            }

            match self.download_one(file, &self.content_dir, fetcher).await {
                Ok(entry) => {
                    state.manifest.insert(file.filename.clone(), entry);
                    outcome.downloaded += 1;
                }
                Err(e) => {
                    // Served from origin until the next pass retries.
                    warn!(filename = %file.filename, "Download failed: {}", e);
                    state.manifest.remove(&file.filename);
                    outcome.failed += 1;
                }
            }
        }

        outcome.evicted = self.evict_stale(&mut state, wanted);

        if let Err(e) = self.persist(&state.manifest) {
            warn!("Failed to write cache manifest: {}", e);
        }

        info!(
            hits = outcome.hits,
            downloaded = outcome.downloaded,
            failed = outcome.failed,
            evicted = outcome.evicted,
            "Content sync complete"
        );
        outcome
    }

    /// Splash assets use the same download discipline in their own
    /// subdirectory, and are exempt from playlist-driven eviction.
    pub async fn sync_splash(&self, wanted: &[WantedFile], fetcher: &dyn MediaFetcher) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();
        let _guard = self.state.lock().await;

        for file in wanted {
            if self.splash_dir.join(&file.filename).exists() {
                outcome.hits += 1;
                continue;
            }
            match self.download_one(file, &self.splash_dir, fetcher).await {
                Ok(_) => outcome.downloaded += 1,
                Err(e) => {
                    warn!(filename = %file.filename, "Splash download failed: {}", e);
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }

    async fn download_one(
        &self,
        file: &WantedFile,
        dir: &Path,
        fetcher: &dyn MediaFetcher,
    ) -> Result<ManifestEntry> {
        let final_path = dir.join(&file.filename);
        let tmp_path = dir.join(format!("{}.part", file.filename));

        let result = fetcher.fetch(&file.url, &tmp_path).await;
        let size = match result {
            Ok(size) => size,
            Err(e) => {
                let _ = std::fs::remove_file(&tmp_path);
                return Err(e);
            }
        };

        std::fs::rename(&tmp_path, &final_path)?;
        info!(filename = %file.filename, size, "Downloaded");

        Ok(ManifestEntry {
            local_path: final_path,
            url: file.url.clone(),
            size,
            synced_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0.0, |d| d.as_secs_f64()),
        })
    }

    /// Remove content files the playlist no longer names, and their
    /// manifest entries.
    fn evict_stale(&self, state: &mut CacheState, wanted: &[WantedFile]) -> usize {
        let keep: std::collections::HashSet<&str> =
            wanted.iter().map(|f| f.filename.as_str()).collect();
        let mut evicted = 0;

        if let Ok(entries) = std::fs::read_dir(&self.content_dir) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !keep.contains(name.as_str()) {
                    if std::fs::remove_file(entry.path()).is_ok() {
                        info!(filename = %name, "Evicted");
                        evicted += 1;
                    } else {
                        warn!(filename = %name, "Failed to evict");
                    }
                }
            }
        }
        state.manifest.retain(|name, _| keep.contains(name.as_str()));
        evicted
    }

    fn persist(&self, manifest: &HashMap<String, ManifestEntry>) -> Result<()> {
        let tmp = self.manifest_path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(manifest)?)?;
        std::fs::rename(&tmp, &self.manifest_path)?;
        Ok(())
    }
}
