//! Host-page surface: element snapshots and interaction primitives.
//!
//! The capture pipeline never touches a live DOM directly — it sees
//! point-in-time element snapshots and drives interactions through the
//! `PageHost` trait. The browser-embedded host implements this over real
//! element queries; tests implement it as a scripted page.

use async_trait::async_trait;

/// On-page position of an element, used for visual (row-major) ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PagePosition {
    pub top: f64,
    pub left: f64,
}

/// An anchor whose href matches the site's post/reel path pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct PostLink {
    pub href: String,
    pub position: PagePosition,
}

impl PostLink {
    pub fn new(href: impl Into<String>, top: f64, left: f64) -> Self {
        Self {
            href: href.into(),
            position: PagePosition { top, left },
        }
    }

    /// The shortcode embedded in a `/p/<code>/` or `/reel/<code>/` path.
    pub fn source_id(&self) -> Option<String> {
        source_id_from_path(&self.href)
    }
}

/// Extract the shortcode from a post or reel path, absolute or relative.
pub fn source_id_from_path(href: &str) -> Option<String> {
    let path = match url::Url::parse(href) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => href.to_string(),
    };
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    match segments.next() {
        Some("p") | Some("reel") => {}
        _ => return None,
    }
    let code = segments.next()?;
    if code.is_empty() {
        return None;
    }
    Some(code.to_string())
}

/// Snapshot of an `<img>` element.
#[derive(Debug, Clone, Default)]
pub struct ImgElement {
    pub src: Option<String>,
    pub srcset: Option<String>,
    /// Nearest enclosing post link, when one exists.
    pub post_link: Option<PostLink>,
}

/// Snapshot of a `<video>` element and its child `<source>` elements.
#[derive(Debug, Clone, Default)]
pub struct VideoElement {
    pub src: Option<String>,
    pub poster: Option<String>,
    pub sources: Vec<String>,
    pub post_link: Option<PostLink>,
}

/// Close interactions, tried in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMethod {
    Button,
    Escape,
    HistoryBack,
}

pub const CLOSE_PRIORITY: [CloseMethod; 3] = [
    CloseMethod::Button,
    CloseMethod::Escape,
    CloseMethod::HistoryBack,
];

#[async_trait]
pub trait PageHost: Send + Sync {
    /// Currently rendered images, feed and detail view alike.
    async fn images(&self) -> Vec<ImgElement>;

    /// Currently rendered videos.
    async fn videos(&self) -> Vec<VideoElement>;

    /// All anchors matching the post/reel path pattern.
    async fn post_links(&self) -> Vec<PostLink>;

    /// Inline script/JSON text blocks, for the embedded-data scanner.
    async fn inline_scripts(&self) -> Vec<String>;

    async fn scroll_to_bottom(&self);

    async fn page_height(&self) -> u64;

    /// Bring a link near the viewport. Returns false when the element is
    /// gone from the DOM.
    async fn scroll_into_view(&self, link: &PostLink) -> bool;

    /// Synthetic open interaction on a post link.
    async fn open_post(&self, link: &PostLink) -> bool;

    /// Whether a modal/detail view is currently showing.
    async fn detail_view_open(&self) -> bool;

    /// Click the carousel "next" control. False when there is no next page.
    async fn click_next(&self) -> bool;

    /// Dispatch one close interaction. True when the detail view went away.
    async fn close_detail(&self, method: CloseMethod) -> bool;

    /// Current location path, for detecting real navigations.
    async fn current_path(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_id_from_post_and_reel_paths() {
        assert_eq!(source_id_from_path("/p/AbC123xyz/").as_deref(), Some("AbC123xyz"));
        assert_eq!(source_id_from_path("/reel/R33L/").as_deref(), Some("R33L"));
        assert_eq!(
            source_id_from_path("https://www.instagram.com/p/AbC123xyz/?img_index=2").as_deref(),
            Some("AbC123xyz")
        );
    }

    #[test]
    fn source_id_rejects_other_paths() {
        assert!(source_id_from_path("/explore/").is_none());
        assert!(source_id_from_path("/username/saved/").is_none());
        assert!(source_id_from_path("/p/").is_none());
        assert!(source_id_from_path("").is_none());
    }
}
