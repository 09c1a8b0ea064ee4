//! Network interception: a non-consuming tee over the host page's request
//! primitives.
//!
//! `ResponseTap` wraps any `HttpClient` and hands matching response bodies
//! to the shape parser on a spawned task, so the original caller gets its
//! untouched response without waiting on extraction. Non-JSON bodies are
//! silently discarded — a miss here costs one response's worth of recall,
//! nothing else.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use feedvault_common::MediaRecord;

use crate::parse;
use crate::persist::SnapshotStore;
use crate::store::SharedStore;

/// Path substrings identifying the site's internal API and post endpoints.
/// Deliberately broad: over-matching costs a wasted parse, under-matching
/// loses media.
const INTEREST_MARKERS: [&str; 8] = [
    "/api/v1/",
    "/api/",
    "graphql",
    "/media/",
    "/info",
    "/p/",
    "/reel/",
    "i.instagram.com",
];

pub fn is_url_of_interest(url: &str) -> bool {
    INTEREST_MARKERS.iter().any(|m| url.contains(m))
}

// --- HttpClient trait ---

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse>;
}

/// reqwest-backed client for on-demand HTML/JSON scraping.
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .context("HTTP request failed")?;
        let status = resp.status().as_u16();
        let body = resp.text().await.context("Failed to read response body")?;
        Ok(HttpResponse { status, body })
    }
}

// --- MediaSink ---

/// Where parsed records go. The tap fires into a sink without awaiting
/// downstream work.
#[async_trait]
pub trait MediaSink: Send + Sync {
    async fn publish(&self, records: Vec<MediaRecord>);
}

/// Sink that merges into the store and saves a snapshot after each batch
/// that actually added something.
pub struct StoreSink {
    store: SharedStore,
    snapshots: Option<Arc<SnapshotStore>>,
    persist_lock: Mutex<()>,
}

impl StoreSink {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            snapshots: None,
            persist_lock: Mutex::new(()),
        }
    }

    pub fn with_snapshots(store: SharedStore, snapshots: Arc<SnapshotStore>) -> Self {
        Self {
            store,
            snapshots: Some(snapshots),
            persist_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl MediaSink for StoreSink {
    async fn publish(&self, records: Vec<MediaRecord>) {
        let added = {
            let mut store = self.store.lock().await;
            records
                .into_iter()
                .filter(|r| store.insert(r.clone()))
                .count()
        };
        if added == 0 {
            return;
        }
        debug!(added, "merged intercepted media batch");
        let Some(snapshots) = &self.snapshots else {
            return;
        };
        // Saves are serialized, and each snapshot is taken only after the
        // previous save completed: a slow backend write can never land a
        // stale snapshot over a newer one.
        let _persisting = self.persist_lock.lock().await;
        let snapshot = self.store.lock().await.snapshot();
        if let Err(e) = snapshots.save(&snapshot).await {
            warn!(error = %e, "failed to persist snapshot after insert batch");
        }
    }
}

// --- Cross-context bridge ---

/// One-way channel carrying parsed records across an isolation boundary
/// (page context → extension context). Only normalized records cross, never
/// raw response bodies.
pub struct MediaBridge;

impl MediaBridge {
    pub fn channel(capacity: usize) -> (BridgeSink, BridgeReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        (BridgeSink { tx }, BridgeReceiver { rx })
    }
}

#[derive(Clone)]
pub struct BridgeSink {
    tx: mpsc::Sender<Vec<MediaRecord>>,
}

#[async_trait]
impl MediaSink for BridgeSink {
    async fn publish(&self, records: Vec<MediaRecord>) {
        if records.is_empty() {
            return;
        }
        // One-way and lossy by contract: a full channel drops the batch
        // rather than blocking the page context.
        if let Err(e) = self.tx.try_send(records) {
            warn!(error = %e, "bridge channel full, dropping media batch");
        }
    }
}

pub struct BridgeReceiver {
    rx: mpsc::Receiver<Vec<MediaRecord>>,
}

impl BridgeReceiver {
    /// Drain the bridge into a sink until the sending side goes away.
    pub async fn pump(mut self, sink: Arc<dyn MediaSink>) {
        while let Some(records) = self.rx.recv().await {
            sink.publish(records).await;
        }
        debug!("media bridge closed");
    }
}

// --- ResponseTap ---

static TAP_INSTALLED: AtomicBool = AtomicBool::new(false);

pub struct ResponseTap {
    inner: Arc<dyn HttpClient>,
    sink: Arc<dyn MediaSink>,
}

impl ResponseTap {
    /// Wrap a client without touching the process-wide install guard.
    /// Composition-friendly; used directly in tests.
    pub fn new(inner: Arc<dyn HttpClient>, sink: Arc<dyn MediaSink>) -> Self {
        Self { inner, sink }
    }

    /// Install the process-wide tap. Repeated installation (e.g. a re-run
    /// of the injection path) must not double-wrap the primitives, so the
    /// second and later calls return None.
    pub fn install(inner: Arc<dyn HttpClient>, sink: Arc<dyn MediaSink>) -> Option<Self> {
        if TAP_INSTALLED.swap(true, Ordering::SeqCst) {
            warn!("response tap already installed, ignoring repeat install");
            return None;
        }
        Some(Self::new(inner, sink))
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn reset_install_guard() {
        TAP_INSTALLED.store(false, Ordering::SeqCst);
    }

    fn tee(&self, url: &str, body: String) {
        let sink = Arc::clone(&self.sink);
        let url = url.to_string();
        tokio::spawn(async move {
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&body) else {
                // Non-JSON response on an API-looking URL; not our concern.
                return;
            };
            let records = parse::parse(&value);
            if records.is_empty() {
                return;
            }
            debug!(url, count = records.len(), "intercepted media records");
            sink.publish(records).await;
        });
    }
}

#[async_trait]
impl HttpClient for ResponseTap {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let response = self.inner.get(url).await?;
        if response.is_ok() && is_url_of_interest(url) {
            // Non-consuming copy; the caller's response goes back untouched.
            self.tee(url, response.body.clone());
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{KeyChange, KeyValueStore, MemoryStore};
    use crate::store::MediaStore;
    use crate::testing::CannedHttpClient;

    #[test]
    fn interest_filter_matches_api_paths() {
        assert!(is_url_of_interest(
            "https://www.instagram.com/api/v1/feed/saved/posts/"
        ));
        assert!(is_url_of_interest("https://www.instagram.com/graphql/query"));
        assert!(is_url_of_interest("https://i.instagram.com/api/v1/media/1/info"));
        assert!(!is_url_of_interest("https://www.instagram.com/accounts/login"));
    }

    #[tokio::test]
    async fn tap_merges_matching_responses_without_altering_them() {
        let body = serde_json::json!({
            "items": [{
                "media_type": 1,
                "code": "TAP",
                "image_versions2": {"candidates": [{"url": "https://cdn/tap.jpg", "width": 1080}]}
            }]
        })
        .to_string();

        let client = Arc::new(CannedHttpClient::new(&body));
        let store = MediaStore::shared();
        let tap = ResponseTap::new(client, Arc::new(StoreSink::new(Arc::clone(&store))));

        let response = tap
            .get("https://www.instagram.com/api/v1/feed/saved/posts/")
            .await
            .unwrap();
        // Caller sees the body untouched.
        assert_eq!(response.body, body);

        // The tee is fire-and-forget; give the spawned task a beat.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.lock().await.stats().images, 1);
    }

    #[tokio::test]
    async fn uninteresting_urls_are_not_parsed() {
        let body = serde_json::json!({
            "items": [{
                "media_type": 1,
                "image_versions2": {"candidates": [{"url": "https://cdn/skip.jpg", "width": 1080}]}
            }]
        })
        .to_string();

        let client = Arc::new(CannedHttpClient::new(&body));
        let store = MediaStore::shared();
        let tap = ResponseTap::new(client, Arc::new(StoreSink::new(Arc::clone(&store))));

        tap.get("https://www.instagram.com/accounts/edit").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.lock().await.stats().images, 0);
    }

    #[tokio::test]
    async fn non_json_bodies_are_silently_discarded() {
        let client = Arc::new(CannedHttpClient::new("<!DOCTYPE html><html></html>"));
        let store = MediaStore::shared();
        let tap = ResponseTap::new(client, Arc::new(StoreSink::new(Arc::clone(&store))));

        let response = tap.get("https://www.instagram.com/api/v1/whatever").await.unwrap();
        assert!(response.is_ok());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.lock().await.stats().images, 0);
    }

    #[tokio::test]
    async fn install_guard_is_idempotent() {
        ResponseTap::reset_install_guard();
        let client: Arc<dyn HttpClient> = Arc::new(CannedHttpClient::new("{}"));
        let store = MediaStore::shared();
        let sink: Arc<dyn MediaSink> = Arc::new(StoreSink::new(store));

        assert!(ResponseTap::install(Arc::clone(&client), Arc::clone(&sink)).is_some());
        assert!(ResponseTap::install(client, sink).is_none());
        ResponseTap::reset_install_guard();
    }

    /// Backend whose first write stalls, so a later write can race past it.
    struct StallingStore {
        inner: MemoryStore,
        stall_first: AtomicBool,
        delay: Duration,
    }

    #[async_trait]
    impl KeyValueStore for StallingStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: String) -> Result<()> {
            if self.stall_first.swap(false, Ordering::SeqCst) {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }

        fn subscribe(&self) -> tokio::sync::broadcast::Receiver<KeyChange> {
            self.inner.subscribe()
        }
    }

    #[tokio::test]
    async fn overlapping_batches_never_persist_a_stale_snapshot() {
        let backend = Arc::new(StallingStore {
            inner: MemoryStore::new(),
            stall_first: AtomicBool::new(true),
            delay: Duration::from_millis(80),
        });
        let snapshots = Arc::new(SnapshotStore::new(
            Arc::clone(&backend) as Arc<dyn KeyValueStore>
        ));
        let store = MediaStore::shared();
        let sink = Arc::new(StoreSink::with_snapshots(
            Arc::clone(&store),
            Arc::clone(&snapshots),
        ));

        // First batch hits the stalled write while the second, larger batch
        // arrives and completes.
        let slow = {
            let sink = Arc::clone(&sink);
            tokio::spawn(async move {
                sink.publish(vec![MediaRecord::image(
                    "https://cdn.example/batch_one_image.jpg",
                )])
                .await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        sink.publish(vec![
            MediaRecord::image("https://cdn.example/batch_one_image.jpg"),
            MediaRecord::image("https://cdn.example/batch_two_image.jpg"),
        ])
        .await;
        slow.await.unwrap();

        assert_eq!(store.lock().await.stats().images, 2);
        // The persisted document must reflect the full store, not the
        // earlier batch's smaller snapshot.
        let persisted = snapshots.load().await.unwrap().unwrap();
        assert_eq!(persisted.images.len(), 2);
    }

    #[tokio::test]
    async fn bridge_forwards_records_one_way() {
        let (sink, receiver) = MediaBridge::channel(16);
        let store = MediaStore::shared();
        let pump = tokio::spawn(receiver.pump(Arc::new(StoreSink::new(Arc::clone(&store)))));

        sink.publish(vec![MediaRecord::image("https://cdn.example/bridge_image.jpg")])
            .await;
        drop(sink);
        pump.await.unwrap();

        assert_eq!(store.lock().await.stats().images, 1);
    }
}
