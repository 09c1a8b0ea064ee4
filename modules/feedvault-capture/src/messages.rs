//! Typed control-surface messages and their dispatcher.
//!
//! Requests arrive as JSON tagged with a `type` discriminant; every request
//! gets exactly one response. The hub owns the long-running work: scroll and
//! capture runs are spawned tasks with run-scoped cancel tokens, so a stop
//! request lands without waiting for the run to notice.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use feedvault_common::Config;

use crate::driver::{CancelToken, CaptureDriver, DelayPolicy};
use crate::page::PageHost;
use crate::persist::SnapshotStore;
use crate::store::SharedStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    GetStats,
    StartScroll,
    StopScroll,
    StartCapture {
        /// Narrow the run to these source ids; absent means everything.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selection: Option<Vec<String>>,
    },
    StopCapture,
    ClearAll,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Response {
    Stats {
        images: usize,
        videos: usize,
        total: usize,
    },
    Started,
    Stopped,
    Cleared,
    Error {
        message: String,
    },
}

/// One background run: its cancel token plus the task driving it.
struct RunningTask {
    cancel: CancelToken,
    handle: JoinHandle<()>,
}

pub struct MessageHub {
    host: Arc<dyn PageHost>,
    store: SharedStore,
    snapshots: Arc<SnapshotStore>,
    config: Config,
    delays: DelayPolicy,
    scroll: Mutex<Option<RunningTask>>,
    capture: Mutex<Option<RunningTask>>,
}

impl MessageHub {
    pub fn new(
        host: Arc<dyn PageHost>,
        store: SharedStore,
        snapshots: Arc<SnapshotStore>,
        config: Config,
    ) -> Self {
        let delays = DelayPolicy::from_config(&config);
        Self {
            host,
            store,
            snapshots,
            config,
            delays,
            scroll: Mutex::new(None),
            capture: Mutex::new(None),
        }
    }

    pub fn with_delays(mut self, delays: DelayPolicy) -> Self {
        self.delays = delays;
        self
    }

    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::GetStats => self.stats().await,
            Request::StartScroll => self.start_scroll().await,
            Request::StopScroll => Self::stop_task(&self.scroll).await,
            Request::StartCapture { selection } => self.start_capture(selection).await,
            Request::StopCapture => Self::stop_task(&self.capture).await,
            Request::ClearAll => self.clear_all().await,
        }
    }

    async fn stats(&self) -> Response {
        let stats = self.store.lock().await.stats();
        Response::Stats {
            images: stats.images,
            videos: stats.videos,
            total: stats.total(),
        }
    }

    async fn start_scroll(&self) -> Response {
        let mut slot = self.scroll.lock().await;
        if Self::still_running(&slot) {
            return Response::Started;
        }
        let driver = self.driver();
        let cancel = driver.cancel_token();
        let handle = tokio::spawn(async move {
            let added = driver.auto_scroll().await;
            info!(added, "scroll run finished");
        });
        *slot = Some(RunningTask { cancel, handle });
        Response::Started
    }

    async fn start_capture(&self, selection: Option<Vec<String>>) -> Response {
        let mut slot = self.capture.lock().await;
        if Self::still_running(&slot) {
            return Response::Started;
        }
        let driver = self.driver();
        let cancel = driver.cancel_token();
        let store = Arc::clone(&self.store);
        let snapshots = Arc::clone(&self.snapshots);
        let selection: Option<HashSet<String>> = selection.map(|ids| ids.into_iter().collect());
        let handle = tokio::spawn(async move {
            match driver.run(selection).await {
                Ok(report) => {
                    let snapshot = store.lock().await.snapshot();
                    if let Err(e) = snapshots.save(&snapshot).await {
                        warn!(error = %e, "failed to persist snapshot after capture run");
                    }
                    info!(
                        captured = report.posts_captured,
                        skipped = report.posts_skipped,
                        "capture run finished"
                    );
                }
                Err(e) => error!(error = %e, "capture run failed"),
            }
        });
        *slot = Some(RunningTask { cancel, handle });
        Response::Started
    }

    /// Cancel a running task. Stopping when nothing runs is a no-op, still
    /// acknowledged as Stopped.
    async fn stop_task(slot: &Mutex<Option<RunningTask>>) -> Response {
        if let Some(task) = slot.lock().await.take() {
            task.cancel.cancel();
        }
        Response::Stopped
    }

    async fn clear_all(&self) -> Response {
        self.store.lock().await.bulk_clear();
        if let Err(e) = self.snapshots.clear().await {
            return Response::Error {
                message: format!("failed to clear persisted snapshot: {e}"),
            };
        }
        info!("collection cleared");
        Response::Cleared
    }

    fn driver(&self) -> CaptureDriver {
        CaptureDriver::new(
            Arc::clone(&self.host),
            Arc::clone(&self.store),
            self.config.clone(),
        )
        .with_delays(self.delays.clone())
    }

    fn still_running(slot: &Option<RunningTask>) -> bool {
        slot.as_ref()
            .is_some_and(|task| !task.handle.is_finished() && !task.cancel.is_cancelled())
    }

    /// Wait for any in-flight background run to finish. Test-only: real
    /// callers observe completion through stats.
    #[cfg(any(test, feature = "test-support"))]
    pub async fn wait_idle(&self) {
        for slot in [&self.scroll, &self.capture] {
            if let Some(task) = slot.lock().await.take() {
                let _ = task.handle.await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{KeyValueStore, MemoryStore};
    use crate::store::MediaStore;
    use crate::testing::ScriptedPage;

    fn hub_for(page: ScriptedPage) -> (MessageHub, SharedStore) {
        let store = MediaStore::shared();
        let snapshots = Arc::new(SnapshotStore::new(
            Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>
        ));
        let config = Config {
            scroll_stability_checks: 2,
            locate_retries: 2,
            modal_open_retries: 2,
            ..Config::default()
        };
        let hub = MessageHub::new(Arc::new(page), Arc::clone(&store), snapshots, config)
            .with_delays(DelayPolicy::zero());
        (hub, store)
    }

    #[test]
    fn requests_use_screaming_snake_wire_tags() {
        let raw = r#"{"type":"START_CAPTURE","selection":["AbC123"]}"#;
        let request: Request = serde_json::from_str(raw).unwrap();
        assert_eq!(
            request,
            Request::StartCapture {
                selection: Some(vec!["AbC123".to_string()])
            }
        );

        let stats = serde_json::to_value(Request::GetStats).unwrap();
        assert_eq!(stats["type"], "GET_STATS");
    }

    #[tokio::test]
    async fn stats_reflect_the_store() {
        let (hub, store) = hub_for(ScriptedPage::new());
        store
            .lock()
            .await
            .insert(feedvault_common::MediaRecord::image(
                "https://cdn.example/hub_stats_image.jpg",
            ));

        let response = hub.handle(Request::GetStats).await;
        assert_eq!(
            response,
            Response::Stats {
                images: 1,
                videos: 0,
                total: 1
            }
        );
    }

    #[tokio::test]
    async fn capture_request_drives_a_full_run() {
        let page = ScriptedPage::new().with_feed_post("HubRun01", 0.0, 0.0, 1);
        let (hub, store) = hub_for(page);

        assert_eq!(
            hub.handle(Request::StartCapture { selection: None }).await,
            Response::Started
        );
        hub.wait_idle().await;

        assert_eq!(store.lock().await.stats().images, 1);
    }

    #[tokio::test]
    async fn clear_all_resets_store_and_snapshot() {
        let page = ScriptedPage::new().with_feed_post("HubClear1", 0.0, 0.0, 1);
        let (hub, store) = hub_for(page);

        hub.handle(Request::StartCapture { selection: None }).await;
        hub.wait_idle().await;
        assert!(store.lock().await.stats().total() > 0);

        assert_eq!(hub.handle(Request::ClearAll).await, Response::Cleared);
        assert_eq!(store.lock().await.stats().total(), 0);
        assert!(hub.snapshots.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stop_without_a_run_is_acknowledged() {
        let (hub, _) = hub_for(ScriptedPage::new());
        assert_eq!(hub.handle(Request::StopCapture).await, Response::Stopped);
        assert_eq!(hub.handle(Request::StopScroll).await, Response::Stopped);
    }
}
