use serde::{Deserialize, Serialize};

use super::id::{ContentId, GroupId};

/// What a content item is, as a tagged variant. Videos may carry an
/// intrinsic duration once known; images never do.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "file_type", rename_all = "lowercase")]
pub enum ContentKind {
    Image,
    Video { intrinsic_duration: Option<f64> },
}

impl ContentKind {
    #[must_use]
    pub const fn file_type(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video { .. } => "video",
        }
    }

    #[must_use]
    pub const fn is_video(&self) -> bool {
        matches!(self, Self::Video { .. })
    }
}

/// A single piece of media inside a schedule group.
///
/// `filename` is the stable on-disk name (UUID + original extension) and is
/// immutable for the item's lifetime; caches key on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentId,
    pub group_id: GroupId,
    pub name: String,
    pub filename: String,
    #[serde(flatten)]
    pub kind: ContentKind,
    pub file_size: u64,
    /// Seconds on screen for images, and the fallback for videos whose
    /// intrinsic duration is unknown.
    pub display_duration: f64,
    pub order: i32,
    pub is_active: bool,
}

impl ContentItem {
    /// Intrinsic duration for videos when known, else `display_duration`.
    #[must_use]
    pub fn effective_duration(&self) -> f64 {
        match self.kind {
            ContentKind::Video {
                intrinsic_duration: Some(d),
            } => d,
            _ => self.display_duration,
        }
    }

    /// Stable filename for an uploaded file: UUID v4 plus the original
    /// extension.
    #[must_use]
    pub fn stable_filename(original_name: &str) -> String {
        let ext = std::path::Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext {
            Some(ext) if !ext.is_empty() => format!("{}.{ext}", uuid::Uuid::new_v4()),
            _ => uuid::Uuid::new_v4().to_string(),
        }
    }
}
