//! Dedup/merge store: the canonical append-only collection of captured
//! media, partitioned into images and videos.
//!
//! Records arrive from four concurrent sources (network tap, DOM scan,
//! page-context bridge, on-demand scrape) in no guaranteed order; identity
//! keys make the merge idempotent regardless of arrival order. Single
//! logical writer — shared across tasks as `Arc<Mutex<MediaStore>>`.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use feedvault_common::{CaptureStats, MediaKind, MediaRecord, MediaSnapshot};

pub type SharedStore = Arc<Mutex<MediaStore>>;

#[derive(Debug, Default)]
pub struct MediaStore {
    images: Vec<MediaRecord>,
    videos: Vec<MediaRecord>,
    seen: HashSet<String>,
}

impl MediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Rebuild a store from a persisted snapshot, re-deriving dedup state.
    pub fn from_snapshot(snapshot: MediaSnapshot) -> Self {
        let mut store = Self::new();
        for record in snapshot.images {
            store.insert_image(record);
        }
        for record in snapshot.videos {
            store.insert_video(record);
        }
        store
    }

    /// Insert into the partition matching the record's kind. Returns true
    /// only when the record was newly added.
    pub fn insert(&mut self, record: MediaRecord) -> bool {
        match record.kind {
            MediaKind::Image => self.insert_image(record),
            MediaKind::Video => self.insert_video(record),
        }
    }

    pub fn insert_image(&mut self, record: MediaRecord) -> bool {
        let Some(key) = record.identity_key() else {
            debug!("dropping image record with no identity");
            return false;
        };
        if self.seen.contains(&key) {
            return false;
        }
        self.seen.insert(key);
        self.images.push(record);
        true
    }

    pub fn insert_video(&mut self, record: MediaRecord) -> bool {
        let Some(key) = record.identity_key() else {
            debug!("dropping video record with no identity");
            return false;
        };
        if self.seen.contains(&key) {
            self.backfill_video(&record);
            return false;
        }
        // A record seen earlier under a postUrl/sourceId key may now be
        // arriving with its direct URL resolved: backfill in place instead
        // of storing a second copy.
        if let Some(existing) = self.unresolved_video_mut(&record) {
            if existing.url.is_none() {
                existing.url = record.url.clone();
                debug!(
                    source_id = record.source_id.as_deref().unwrap_or(""),
                    "backfilled video URL"
                );
            }
            if existing.thumbnail_url.is_none() {
                existing.thumbnail_url = record.thumbnail_url.clone();
            }
            self.seen.insert(key);
            return false;
        }
        self.seen.insert(key);
        self.videos.push(record);
        true
    }

    /// Duplicate-key arrival may still carry fields the stored copy lacks.
    fn backfill_video(&mut self, incoming: &MediaRecord) {
        let Some(key) = incoming.identity_key() else {
            return;
        };
        if let Some(existing) = self
            .videos
            .iter_mut()
            .find(|r| r.identity_key().as_deref() == Some(key.as_str()))
        {
            if existing.url.is_none() {
                existing.url = incoming.url.clone();
            }
            if existing.thumbnail_url.is_none() {
                existing.thumbnail_url = incoming.thumbnail_url.clone();
            }
        }
    }

    fn unresolved_video_mut(&mut self, incoming: &MediaRecord) -> Option<&mut MediaRecord> {
        let source_id = incoming.source_id.as_deref()?;
        incoming.url.as_deref()?;
        self.videos
            .iter_mut()
            .find(|r| r.url.is_none() && r.source_id.as_deref() == Some(source_id))
    }

    /// Empty both partitions and the seen-key set in one step. Callers
    /// holding the store lock never observe a half-cleared state.
    pub fn bulk_clear(&mut self) {
        self.images.clear();
        self.videos.clear();
        self.seen.clear();
    }

    pub fn snapshot(&self) -> MediaSnapshot {
        MediaSnapshot {
            images: self.images.clone(),
            videos: self.videos.clone(),
        }
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            images: self.images.len(),
            videos: self.videos.len(),
        }
    }

    pub fn images(&self) -> &[MediaRecord] {
        &self.images
    }

    pub fn videos(&self) -> &[MediaRecord] {
        &self.videos
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.seen.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent_insert() {
        let mut store = MediaStore::new();
        assert!(store.insert_image(MediaRecord::image("https://cdn.example/a.jpg?sig=1")));
        assert!(!store.insert_image(MediaRecord::image("https://cdn.example/a.jpg?sig=1")));
        assert_eq!(store.stats().images, 1);
    }

    #[test]
    fn records_differing_only_in_query_collapse() {
        let mut store = MediaStore::new();
        assert!(store.insert_image(MediaRecord::image("https://cdn.example/a.jpg?sig=1")));
        assert!(!store.insert_image(MediaRecord::image("https://cdn.example/a.jpg?sig=2")));
        assert_eq!(store.stats().images, 1);
        // The first-seen signed URL is what stays stored.
        assert_eq!(
            store.images()[0].url.as_deref(),
            Some("https://cdn.example/a.jpg?sig=1")
        );
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut store = MediaStore::new();
        store.insert_image(MediaRecord::image("https://cdn.example/first_image.jpg"));
        store.insert_image(MediaRecord::image("https://cdn.example/second_image.jpg"));
        store.insert_image(MediaRecord::image("https://cdn.example/third_image.jpg"));
        let urls: Vec<&str> = store.images().iter().filter_map(|r| r.url.as_deref()).collect();
        assert_eq!(
            urls,
            vec![
                "https://cdn.example/first_image.jpg",
                "https://cdn.example/second_image.jpg",
                "https://cdn.example/third_image.jpg"
            ]
        );
    }

    #[test]
    fn video_url_backfill_by_source_id() {
        let mut store = MediaStore::new();

        let mut pending = MediaRecord::new(MediaKind::Video);
        pending.source_id = Some("abc".to_string());
        assert!(store.insert_video(pending));
        assert_eq!(store.stats().videos, 1);
        assert!(store.videos()[0].url.is_none());

        let mut resolved = MediaRecord::video("https://cdn.example/abc_video.mp4?sig=9");
        resolved.source_id = Some("abc".to_string());
        assert!(!store.insert_video(resolved), "backfill is not a new record");

        assert_eq!(store.stats().videos, 1);
        assert_eq!(
            store.videos()[0].url.as_deref(),
            Some("https://cdn.example/abc_video.mp4?sig=9")
        );
        // The resolved URL's key is now seen too.
        assert!(!store.insert_video(MediaRecord::video("https://cdn.example/abc_video.mp4?sig=10")));
    }

    #[test]
    fn bulk_clear_resets_dedup_state() {
        let mut store = MediaStore::new();
        store.insert_image(MediaRecord::image("https://cdn.example/a_image.jpg"));
        store.insert_video(MediaRecord::video("https://cdn.example/a_video.mp4"));
        store.bulk_clear();

        assert_eq!(store.stats(), CaptureStats::default());
        // Previously-seen keys insert as new again.
        assert!(store.insert_image(MediaRecord::image("https://cdn.example/a_image.jpg")));
    }

    #[test]
    fn unidentifiable_record_is_dropped() {
        let mut store = MediaStore::new();
        assert!(!store.insert_image(MediaRecord::new(MediaKind::Image)));
        assert_eq!(store.stats().images, 0);
    }

    #[test]
    fn snapshot_restore_round_trip() {
        let mut store = MediaStore::new();
        store.insert_image(MediaRecord::image("https://cdn.example/a_image.jpg?sig=1"));
        store.insert_video(MediaRecord::video("https://cdn.example/a_video.mp4?sig=1"));

        let restored = MediaStore::from_snapshot(store.snapshot());
        assert_eq!(restored.stats(), store.stats());
        // Dedup state was re-derived, not lost.
        let mut restored = restored;
        assert!(!restored.insert_image(MediaRecord::image("https://cdn.example/a_image.jpg?sig=2")));
    }
}
