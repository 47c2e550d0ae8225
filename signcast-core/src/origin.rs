//! Per-group sync origins.
//!
//! The origin is the wall-clock instant at which cycle position zero is
//! defined. It is re-minted only when the group's effective playlist
//! composition changes, so every player, whenever it enrolled, receives
//! the same origin and computes the same current item.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::models::{ContentItem, GroupId};
use crate::Result;

/// Current server wall-clock as seconds since the Unix epoch.
#[must_use]
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}

/// The published sync contract for one schedule group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOrigin {
    pub group_id: GroupId,
    /// Seconds since epoch at which cycle position zero is defined.
    pub origin: f64,
    /// Sum of effective durations over the active playlist.
    pub cycle_duration: f64,
    pub composition_hash: String,
}

/// Digest of the ordered `(content_id, effective_duration)` pairs. Any
/// change to an item's membership, order, or effective duration changes it.
#[must_use]
pub fn composition_hash(playlist: &[ContentItem]) -> String {
    let mut hasher = Sha256::new();
    for item in playlist {
        hasher.update(item.id.as_i64().to_le_bytes());
        hasher.update(item.effective_duration().to_bits().to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Stores `(origin, cycle_duration, composition_hash)` per group, persisted
/// as JSON so origins survive server restarts.
pub struct SyncOriginStore {
    path: Option<PathBuf>,
    origins: RwLock<HashMap<GroupId, SyncOrigin>>,
}

impl SyncOriginStore {
    /// In-memory store with no persistence.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            origins: RwLock::new(HashMap::new()),
        }
    }

    /// Load persisted origins from `path`, starting empty if the file does
    /// not exist yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let origins = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            let list: Vec<SyncOrigin> = serde_json::from_str(&data)?;
            info!(groups = list.len(), "Restored sync origins");
            list.into_iter().map(|o| (o.group_id, o)).collect()
        } else {
            HashMap::new()
        };
        Ok(Self {
            path: Some(path),
            origins: RwLock::new(origins),
        })
    }

    /// Current origin for a group, if one has been minted.
    #[must_use]
    pub fn get(&self, group_id: GroupId) -> Option<SyncOrigin> {
        self.origins.read().get(&group_id).cloned()
    }

    /// Reconcile the stored triple with the group's current playlist.
    ///
    /// If the composition hash is unchanged the stored triple is returned
    /// untouched; this is what keeps every player on the same origin. A
    /// changed hash re-mints the origin at `now` and persists.
    pub fn refresh(
        &self,
        group_id: GroupId,
        playlist: &[ContentItem],
        now: f64,
    ) -> Result<SyncOrigin> {
        let hash = composition_hash(playlist);

        {
            let origins = self.origins.read();
            if let Some(existing) = origins.get(&group_id) {
                if existing.composition_hash == hash {
                    return Ok(existing.clone());
                }
            }
        }

        let cycle_duration: f64 = playlist.iter().map(ContentItem::effective_duration).sum();
        let minted = SyncOrigin {
            group_id,
            origin: now,
            cycle_duration,
            composition_hash: hash,
        };

        let mut origins = self.origins.write();
        // Re-check under the write lock; a concurrent refresh may have
        // minted the same composition already.
        if let Some(existing) = origins.get(&group_id) {
            if existing.composition_hash == minted.composition_hash {
                return Ok(existing.clone());
            }
        }
        debug!(
            group_id = group_id.as_i64(),
            origin = minted.origin,
            cycle_duration = minted.cycle_duration,
            "Minted new sync origin"
        );
        origins.insert(group_id, minted.clone());
        self.persist_locked(&origins)?;
        Ok(minted)
    }

    /// Drop the origin for a deleted group.
    pub fn remove(&self, group_id: GroupId) -> Result<()> {
        let mut origins = self.origins.write();
        if origins.remove(&group_id).is_some() {
            self.persist_locked(&origins)?;
        }
        Ok(())
    }

    fn persist_locked(&self, origins: &HashMap<GroupId, SyncOrigin>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut list: Vec<&SyncOrigin> = origins.values().collect();
        list.sort_by_key(|o| o.group_id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&list)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
