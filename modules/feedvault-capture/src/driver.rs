//! Automated capture driver.
//!
//! State machine for one capture run: scroll the feed until its height
//! stabilizes, enumerate post links in visual order, then for each target
//! open the post, page through its carousel capturing after each page, and
//! close it. Every interaction is followed by a randomized delay — pacing
//! against the host site's anti-automation heuristics, wider between posts
//! than within one post's carousel.
//!
//! One missing or broken post never aborts the run: it is skipped after
//! bounded retries and the loop moves on.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use feedvault_common::Config;

use crate::page::{source_id_from_path, PageHost, PostLink, CLOSE_PRIORITY};
use crate::scan;
use crate::session::CaptureSession;
use crate::store::SharedStore;

/// Vertical tolerance when grouping post links into visual rows, pixels.
const ROW_TOLERANCE_PX: f64 = 40.0;

// --- Pacing ---

/// Jitter ranges for human-like pacing. Tests inject `zero()` for
/// determinism.
#[derive(Debug, Clone)]
pub struct DelayPolicy {
    pub between_posts_ms: Range<u64>,
    pub within_carousel_ms: Range<u64>,
    pub scroll_interval: Duration,
}

impl DelayPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            between_posts_ms: config.post_delay_min_ms..config.post_delay_max_ms,
            within_carousel_ms: config.carousel_delay_min_ms..config.carousel_delay_max_ms,
            scroll_interval: Duration::from_millis(config.scroll_interval_ms),
        }
    }

    pub fn zero() -> Self {
        Self {
            between_posts_ms: 0..0,
            within_carousel_ms: 0..0,
            scroll_interval: Duration::ZERO,
        }
    }

    async fn pause(&self, range: &Range<u64>) {
        let ms = if range.end > range.start {
            rand::rng().random_range(range.clone())
        } else {
            range.start
        };
        if ms > 0 {
            sleep(Duration::from_millis(ms)).await;
        }
    }
}

// --- Cancellation ---

/// Run-scoped cooperative stop flag, polled at the top of every loop
/// iteration. Partially captured data stays in the store.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::SeqCst)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DriverReport {
    pub posts_targeted: usize,
    pub posts_captured: usize,
    pub posts_skipped: usize,
    pub records_added: usize,
    pub cancelled: bool,
}

// --- Driver ---

pub struct CaptureDriver {
    host: Arc<dyn PageHost>,
    store: SharedStore,
    config: Config,
    delays: DelayPolicy,
    cancel: CancelToken,
}

impl CaptureDriver {
    pub fn new(host: Arc<dyn PageHost>, store: SharedStore, config: Config) -> Self {
        let delays = DelayPolicy::from_config(&config);
        Self {
            host,
            store,
            config,
            delays,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_delays(mut self, delays: DelayPolicy) -> Self {
        self.delays = delays;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run a full capture: scroll, enumerate, then open each target post in
    /// turn. `selection` narrows the run to a user-chosen subset of posts.
    pub async fn run(&self, selection: Option<HashSet<String>>) -> Result<DriverReport> {
        let mut session = CaptureSession::new();
        let mut report = DriverReport::default();
        info!(run_id = %session.run_id, "automated capture starting");

        report.records_added += self.auto_scroll().await;

        let targets = self.enumerate_targets(selection.as_ref()).await;
        report.posts_targeted = targets.len();
        info!(targets = targets.len(), "capture targets enumerated");
        session.enqueue(targets);

        while let Some(target) = session.next_target() {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let Some(source_id) = target.source_id() else {
                report.posts_skipped += 1;
                continue;
            };
            if !session.mark_expanded(&source_id) {
                continue;
            }
            if self.capture_post(&source_id, &target, &mut report).await {
                report.posts_captured += 1;
            } else {
                report.posts_skipped += 1;
            }
            self.delays.pause(&self.delays.between_posts_ms).await;
        }

        info!(
            run_id = %session.run_id,
            captured = report.posts_captured,
            skipped = report.posts_skipped,
            records = report.records_added,
            cancelled = report.cancelled,
            "automated capture finished"
        );
        Ok(report)
    }

    /// Scroll to the bottom until page height is unchanged for the
    /// configured number of consecutive checks, capturing as content loads.
    /// Returns the number of records newly added.
    pub async fn auto_scroll(&self) -> usize {
        let mut added = 0;
        let mut last_height = 0u64;
        let mut stable = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.host.scroll_to_bottom().await;
            added += self.capture_visible().await;
            sleep(self.delays.scroll_interval).await;

            let height = self.host.page_height().await;
            if height == last_height {
                stable += 1;
                if stable >= self.config.scroll_stability_checks {
                    break;
                }
            } else {
                stable = 0;
                last_height = height;
            }
        }
        debug!(added, final_height = last_height, "auto-scroll stabilized");
        added
    }

    /// Collect post links, dedup by source id, apply the optional selection,
    /// and order row-major (top-to-bottom, left-to-right within a row band)
    /// so capture order matches what a user sees.
    pub async fn enumerate_targets(&self, selection: Option<&HashSet<String>>) -> Vec<PostLink> {
        let links = self.host.post_links().await;
        let mut seen = HashSet::new();
        let mut targets: Vec<PostLink> = links
            .into_iter()
            .filter(|link| {
                let Some(id) = link.source_id() else {
                    return false;
                };
                if let Some(selection) = selection {
                    if !selection.contains(&id) {
                        return false;
                    }
                }
                seen.insert(id)
            })
            .collect();

        targets.sort_by(|a, b| {
            let row_a = (a.position.top / ROW_TOLERANCE_PX).round() as i64;
            let row_b = (b.position.top / ROW_TOLERANCE_PX).round() as i64;
            row_a.cmp(&row_b).then(
                a.position
                    .left
                    .partial_cmp(&b.position.left)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
        });
        targets
    }

    /// Capture the DOM as currently rendered into the store. Returns newly
    /// added record count.
    pub async fn capture_visible(&self) -> usize {
        let records = scan::scan(self.host.as_ref()).await;
        let mut store = self.store.lock().await;
        records.into_iter().filter(|r| store.insert(r.clone())).count()
    }

    async fn capture_post(
        &self,
        source_id: &str,
        target: &PostLink,
        report: &mut DriverReport,
    ) -> bool {
        // Re-locate fresh every time: DOM mutations from the previous post
        // invalidate stale references.
        let Some(link) = self.locate(source_id, target).await else {
            warn!(source_id, "post link not found after retries, skipping");
            return false;
        };

        self.host.scroll_into_view(&link).await;
        if !self.host.open_post(&link).await {
            warn!(source_id, "open interaction failed, skipping");
            return false;
        }
        if !self.await_detail_view().await {
            warn!(source_id, "detail view never appeared, skipping");
            self.close_detail().await;
            return false;
        }

        report.records_added += self.capture_visible().await;

        for page in 0..self.config.carousel_page_cap {
            if self.cancel.is_cancelled() {
                break;
            }
            if !self.host.click_next().await {
                break;
            }
            self.delays.pause(&self.delays.within_carousel_ms).await;
            report.records_added += self.capture_visible().await;
            debug!(source_id, page = page + 1, "carousel page captured");
        }

        self.close_detail().await;
        self.await_feed_ready().await;
        true
    }

    async fn locate(&self, source_id: &str, last_known: &PostLink) -> Option<PostLink> {
        for attempt in 0..self.config.locate_retries {
            for link in self.host.post_links().await {
                if link.source_id().as_deref() == Some(source_id) {
                    return Some(link);
                }
            }
            // Scroll back near where it last was and try again.
            self.host.scroll_into_view(last_known).await;
            debug!(source_id, attempt, "post link missing, scrolled back to retry");
            self.delays.pause(&self.delays.within_carousel_ms).await;
        }
        None
    }

    async fn await_detail_view(&self) -> bool {
        for _ in 0..self.config.modal_open_retries {
            if self.host.detail_view_open().await {
                return true;
            }
            self.delays.pause(&self.delays.within_carousel_ms).await;
        }
        false
    }

    async fn close_detail(&self) {
        for method in CLOSE_PRIORITY {
            if self.host.close_detail(method).await {
                return;
            }
        }
        warn!("detail view did not close by any method");
    }

    /// An open/close can turn into a real navigation. Pause with bounded
    /// retries until the location is a feed path again.
    async fn await_feed_ready(&self) {
        for _ in 0..self.config.modal_open_retries {
            let path = self.host.current_path().await;
            if source_id_from_path(&path).is_none() {
                return;
            }
            self.delays.pause(&self.delays.within_carousel_ms).await;
        }
        warn!("page did not return to the feed, continuing anyway");
    }
}
