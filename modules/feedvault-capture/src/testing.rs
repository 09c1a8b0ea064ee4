//! Test doubles for the traits at the pipeline's seams. Compiled for this
//! crate's own tests and, behind the `test-support` feature, for downstream
//! integration tests.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::intercept::{HttpClient, HttpResponse};
use crate::page::{CloseMethod, ImgElement, PageHost, PostLink, VideoElement};

// --- HTTP ---

/// Client that answers every GET with one canned body.
pub struct CannedHttpClient {
    status: u16,
    body: String,
    requests: Mutex<Vec<String>>,
}

impl CannedHttpClient {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl HttpClient for CannedHttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(url.to_string());
        Ok(HttpResponse {
            status: self.status,
            body: self.body.clone(),
        })
    }
}

// --- Page ---

struct ScriptedPost {
    source_id: String,
    top: f64,
    left: f64,
    carousel_pages: u32,
}

#[derive(Default)]
struct PageState {
    /// Open detail view: index into `posts` plus the 1-based carousel page.
    open: Option<(usize, u32)>,
    height_step: usize,
    links_listed: bool,
    last_closed: Option<usize>,
}

/// A scripted saved-media feed. Feed thumbnails carry a fixed-size token so
/// the classifier rejects them; opening a post reveals one full-resolution
/// image per carousel page.
#[derive(Default)]
pub struct ScriptedPage {
    posts: Vec<ScriptedPost>,
    heights: Vec<u64>,
    unopenable: HashSet<String>,
    vanishing: HashSet<String>,
    sticky_path: bool,
    scripts: Vec<String>,
    state: Mutex<PageState>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed_post(
        mut self,
        source_id: impl Into<String>,
        top: f64,
        left: f64,
        carousel_pages: u32,
    ) -> Self {
        self.posts.push(ScriptedPost {
            source_id: source_id.into(),
            top,
            left,
            carousel_pages,
        });
        self
    }

    /// Page heights reported on successive checks; the last repeats forever.
    pub fn with_heights(mut self, heights: Vec<u64>) -> Self {
        self.heights = heights;
        self
    }

    pub fn with_inline_script(mut self, text: impl Into<String>) -> Self {
        self.scripts.push(text.into());
        self
    }

    /// Make open interactions on this post fail.
    pub fn failing_open(mut self, source_id: impl Into<String>) -> Self {
        self.unopenable.insert(source_id.into());
        self
    }

    /// Drop this post's link from `post_links` after the first listing, as
    /// if a virtualized feed unmounted it.
    pub fn vanishing_link(mut self, source_id: impl Into<String>) -> Self {
        self.vanishing.insert(source_id.into());
        self
    }

    /// Keep `current_path` on the last closed post's path, as if closing
    /// navigated for real instead of dismissing a modal.
    pub fn sticky_path(mut self) -> Self {
        self.sticky_path = true;
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.state.lock().expect("page state lock")
    }

    fn link_for(&self, post: &ScriptedPost) -> PostLink {
        PostLink::new(format!("/p/{}/", post.source_id), post.top, post.left)
    }

    fn detail_image(post: &ScriptedPost, page: u32) -> ImgElement {
        ImgElement {
            src: Some(format!(
                "https://scontent.cdninstagram.com/v/t51.29350-15/{}_page{}_full_resolution.jpg",
                post.source_id, page
            )),
            srcset: None,
            post_link: Some(PostLink::new(format!("/p/{}/", post.source_id), 0.0, 0.0)),
        }
    }

    fn feed_thumbnail(&self, post: &ScriptedPost) -> ImgElement {
        ImgElement {
            src: Some(format!(
                "https://scontent.cdninstagram.com/v/t51.29350-15/s320x320/{}_grid_preview.jpg",
                post.source_id
            )),
            srcset: None,
            post_link: Some(self.link_for(post)),
        }
    }
}

#[async_trait]
impl PageHost for ScriptedPage {
    async fn images(&self) -> Vec<ImgElement> {
        if let Some((index, page)) = self.state().open {
            return vec![Self::detail_image(&self.posts[index], page)];
        }
        self.posts.iter().map(|p| self.feed_thumbnail(p)).collect()
    }

    async fn videos(&self) -> Vec<VideoElement> {
        Vec::new()
    }

    async fn post_links(&self) -> Vec<PostLink> {
        let first_listing = {
            let mut state = self.state();
            let first = !state.links_listed;
            state.links_listed = true;
            first
        };
        self.posts
            .iter()
            .filter(|p| first_listing || !self.vanishing.contains(&p.source_id))
            .map(|p| self.link_for(p))
            .collect()
    }

    async fn inline_scripts(&self) -> Vec<String> {
        self.scripts.clone()
    }

    async fn scroll_to_bottom(&self) {}

    async fn page_height(&self) -> u64 {
        let mut state = self.state();
        let height = match self.heights.get(state.height_step) {
            Some(h) => *h,
            None => self.heights.last().copied().unwrap_or(0),
        };
        state.height_step += 1;
        height
    }

    async fn scroll_into_view(&self, _link: &PostLink) -> bool {
        true
    }

    async fn open_post(&self, link: &PostLink) -> bool {
        let Some(source_id) = link.source_id() else {
            return false;
        };
        if self.unopenable.contains(&source_id) {
            return false;
        }
        let Some(index) = self.posts.iter().position(|p| p.source_id == source_id) else {
            return false;
        };
        self.state().open = Some((index, 1));
        true
    }

    async fn detail_view_open(&self) -> bool {
        self.state().open.is_some()
    }

    async fn click_next(&self) -> bool {
        let mut state = self.state();
        let Some((index, page)) = state.open else {
            return false;
        };
        if page >= self.posts[index].carousel_pages {
            return false;
        }
        state.open = Some((index, page + 1));
        true
    }

    async fn close_detail(&self, _method: CloseMethod) -> bool {
        let mut state = self.state();
        match state.open.take() {
            Some((index, _)) => {
                state.last_closed = Some(index);
                true
            }
            None => false,
        }
    }

    async fn current_path(&self) -> String {
        let state = self.state();
        if let Some((index, _)) = state.open {
            return format!("/p/{}/", self.posts[index].source_id);
        }
        if self.sticky_path {
            if let Some(index) = state.last_closed {
                return format!("/p/{}/", self.posts[index].source_id);
            }
        }
        "/username/saved/".to_string()
    }
}
