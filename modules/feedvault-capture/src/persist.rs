//! Snapshot persistence over a key-value backend.
//!
//! The whole collection persists as one JSON document under a single key.
//! Writes go whole-snapshot; there is no incremental format to migrate.
//! The backend is a trait so the browser-embedded build can sit on the
//! extension's storage area while tests and the replay CLI use memory.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use feedvault_common::MediaSnapshot;

/// The one key the media snapshot lives under.
pub const SNAPSHOT_KEY: &str = "feedvault_media";

/// A key change, broadcast to subscribers after the write lands.
#[derive(Debug, Clone)]
pub struct KeyChange {
    pub key: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// Change notifications for every set/remove on this store.
    fn subscribe(&self) -> broadcast::Receiver<KeyChange>;
}

/// In-memory backend, used by tests and the replay CLI.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    changes: broadcast::Sender<KeyChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            entries: Mutex::new(HashMap::new()),
            changes,
        }
    }

    fn notify(&self, key: &str, old: Option<String>, new: Option<String>) {
        // No subscribers is fine; the send result only reports that.
        let _ = self.changes.send(KeyChange {
            key: key.to_string(),
            old,
            new,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let old = self
            .entries
            .lock()
            .await
            .insert(key.to_string(), value.clone());
        self.notify(key, old, Some(value));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let old = self.entries.lock().await.remove(key);
        if old.is_some() {
            self.notify(key, old, None);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<KeyChange> {
        self.changes.subscribe()
    }
}

/// Typed facade over the backend for the media snapshot document.
pub struct SnapshotStore {
    backend: Arc<dyn KeyValueStore>,
}

impl SnapshotStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Load the persisted snapshot, or None when nothing was ever saved.
    /// A corrupt document is an error, not an empty snapshot — the caller
    /// decides whether to start over.
    pub async fn load(&self) -> Result<Option<MediaSnapshot>> {
        let Some(raw) = self.backend.get(SNAPSHOT_KEY).await? else {
            return Ok(None);
        };
        let snapshot =
            serde_json::from_str(&raw).context("Failed to decode persisted media snapshot")?;
        Ok(Some(snapshot))
    }

    pub async fn save(&self, snapshot: &MediaSnapshot) -> Result<()> {
        let raw = serde_json::to_string(snapshot).context("Failed to encode media snapshot")?;
        self.backend.set(SNAPSHOT_KEY, raw).await?;
        debug!(
            images = snapshot.images.len(),
            videos = snapshot.videos.len(),
            "media snapshot persisted"
        );
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.backend.remove(SNAPSHOT_KEY).await
    }
}
