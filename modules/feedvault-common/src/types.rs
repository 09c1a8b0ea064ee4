use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::urls;

// --- Media Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Canonical unit of capture. One image or one video, never a carousel —
/// carousels are expanded into their children before a record is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRecord {
    pub kind: MediaKind,
    /// Direct CDN URL, with its signed query parameters intact. May be None
    /// for a video until a later response resolves it.
    pub url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub post_url: Option<String>,
    /// The host site's short alphanumeric post identifier ("shortcode").
    pub source_id: Option<String>,
    /// 1-based position within a multi-item post.
    pub carousel_index: Option<u32>,
    pub captured_at: DateTime<Utc>,

    // Opportunistic metadata — carried when a response happens to include it.
    pub author: Option<String>,
    pub caption: Option<String>,
    pub like_count: Option<i64>,
    pub comment_count: Option<i64>,
    pub taken_at: Option<DateTime<Utc>>,
}

impl MediaRecord {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            url: None,
            thumbnail_url: None,
            post_url: None,
            source_id: None,
            carousel_index: None,
            captured_at: Utc::now(),
            author: None,
            caption: None,
            like_count: None,
            comment_count: None,
            taken_at: None,
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        let mut record = Self::new(MediaKind::Image);
        record.url = Some(url.into());
        record
    }

    pub fn video(url: impl Into<String>) -> Self {
        let mut record = Self::new(MediaKind::Video);
        record.url = Some(url.into());
        record
    }

    /// Deduplication key: normalized URL when present, else post URL, else
    /// source id. None means the record carries nothing to identify it by.
    pub fn identity_key(&self) -> Option<String> {
        if let Some(url) = self.url.as_deref() {
            return Some(urls::normalize(url));
        }
        if let Some(post_url) = self.post_url.as_deref() {
            return Some(post_url.to_string());
        }
        self.source_id.clone()
    }
}

/// Point-in-time copy of both store partitions, also the persisted format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaSnapshot {
    #[serde(default)]
    pub images: Vec<MediaRecord>,
    #[serde(default)]
    pub videos: Vec<MediaRecord>,
}

impl MediaSnapshot {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.videos.is_empty()
    }
}

/// Partition counts surfaced to the UI layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureStats {
    pub images: usize,
    pub videos: usize,
}

impl CaptureStats {
    pub fn total(&self) -> usize {
        self.images + self.videos
    }
}
