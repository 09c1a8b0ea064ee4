//! DOM fallback scanner.
//!
//! Network interception misses media that rendered before the tap went in,
//! or that arrived in a response the filter didn't cover. This scanner
//! recovers best-effort URLs from what is actually on screen. It is a
//! secondary recall mechanism, not authoritative, so every candidate goes
//! through the classifier before a record is emitted — a false positive
//! here is costlier than a miss elsewhere.

use regex::Regex;
use tracing::debug;

use feedvault_common::{urls, MediaKind, MediaRecord};

use crate::page::{ImgElement, PageHost, PostLink, VideoElement};

/// Pure read of a set of rendered elements into media records.
pub fn scan_elements(images: &[ImgElement], videos: &[VideoElement]) -> Vec<MediaRecord> {
    let mut out = Vec::new();
    for img in images {
        if let Some(record) = image_record(img) {
            out.push(record);
        }
    }
    for video in videos {
        out.extend(video_records(video));
    }
    out
}

/// Snapshot the host's current DOM and scan it, including embedded scripts.
pub async fn scan(host: &dyn PageHost) -> Vec<MediaRecord> {
    let images = host.images().await;
    let videos = host.videos().await;
    let mut records = scan_elements(&images, &videos);
    for text in host.inline_scripts().await {
        records.extend(scan_script_text(&text));
    }
    debug!(count = records.len(), "DOM scan complete");
    records
}

fn image_record(img: &ImgElement) -> Option<MediaRecord> {
    // srcset carries the full resolution ladder; prefer its widest entry
    // over whatever src happens to be showing.
    let url = img
        .srcset
        .as_deref()
        .and_then(best_srcset_url)
        .or_else(|| img.src.clone())
        .filter(|u| urls::is_candidate_media_url(u))?;

    let mut record = MediaRecord::new(MediaKind::Image);
    record.url = Some(url);
    attach_post_link(&mut record, img.post_link.as_ref());
    Some(record)
}

fn video_records(video: &VideoElement) -> Vec<MediaRecord> {
    let mut out = Vec::new();
    let poster = video
        .poster
        .clone()
        .filter(|p| urls::is_candidate_media_url(p));

    let mut push = |url: &str| {
        if !urls::is_candidate_media_url(url) {
            return;
        }
        let mut record = MediaRecord::new(MediaKind::Video);
        record.url = Some(url.to_string());
        record.thumbnail_url = poster.clone();
        attach_post_link(&mut record, video.post_link.as_ref());
        out.push(record);
    };

    if let Some(src) = video.src.as_deref() {
        push(src);
    }
    for source in &video.sources {
        push(source);
    }

    // A poster with no playable source still identifies the video for
    // later URL backfill.
    if out.is_empty() {
        if let Some(poster) = poster {
            let mut record = MediaRecord::new(MediaKind::Video);
            record.thumbnail_url = Some(poster);
            attach_post_link(&mut record, video.post_link.as_ref());
            if record.post_url.is_some() || record.source_id.is_some() {
                out.push(record);
            }
        }
    }
    out
}

fn attach_post_link(record: &mut MediaRecord, link: Option<&PostLink>) {
    if let Some(link) = link {
        record.post_url = Some(link.href.clone());
        record.source_id = link.source_id();
    }
}

/// Pick the widest entry from a `url NNNw, url NNNw` responsive source list.
fn best_srcset_url(srcset: &str) -> Option<String> {
    let entry_re = Regex::new(r"^(\S+)\s+(\d+)w$").expect("valid regex");
    let mut best_url: Option<&str> = None;
    let mut best_width = 0u64;
    for part in srcset.split(',') {
        let Some(cap) = entry_re.captures(part.trim()) else {
            continue;
        };
        let width: u64 = cap[2].parse().unwrap_or(0);
        if best_url.is_none() || width > best_width {
            best_width = width;
            best_url = cap.get(1).map(|m| m.as_str());
        }
    }
    best_url.map(String::from)
}

// --- Embedded-script scanner ---

/// Regex scan of inline script/JSON text for video URLs that never crossed
/// the network tap (server-rendered payloads, preloaded data).
pub fn scan_script_text(text: &str) -> Vec<MediaRecord> {
    let mut out = Vec::new();
    let mut push_video = |raw: &str| {
        let url = decode_escaped_url(raw);
        if url.len() < 30 || !urls::is_video_url(&url) || !urls::is_candidate_media_url(&url) {
            return;
        }
        let mut record = MediaRecord::new(MediaKind::Video);
        record.url = Some(url);
        out.push(record);
    };

    // Direct .mp4 URLs, possibly with escaped slashes.
    let mp4_re = Regex::new(r#"https?:\\?/\\?/[^"'\s\\]+\.mp4[^"'\s\\]*"#).expect("valid regex");
    for m in mp4_re.find_iter(text) {
        push_video(m.as_str());
    }

    // Explicit "video_url" fields.
    let vu_re = Regex::new(r#""video_url"\s*:\s*"([^"]+)""#).expect("valid regex");
    for cap in vu_re.captures_iter(text) {
        push_video(&cap[1]);
    }

    // Generic "url" fields that look like video variants.
    let url_re = Regex::new(r#""url"\s*:\s*"(https?:[^"]+)""#).expect("valid regex");
    for cap in url_re.captures_iter(text) {
        let decoded = decode_escaped_url(&cap[1]);
        if decoded.contains(".mp4") || decoded.contains("/video") {
            push_video(&cap[1]);
        }
    }

    out
}

/// Undo the escaping the host embeds URLs with inside script text.
fn decode_escaped_url(raw: &str) -> String {
    raw.replace("\\u002F", "/")
        .replace("\\u0026", "&")
        .replace("\\/", "/")
        .replace('\\', "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PostLink;

    const CDN_IMG: &str = "https://scontent.cdninstagram.com/v/t51.29350-15/photo_full.jpg";
    const CDN_VID: &str = "https://scontent.cdninstagram.com/v/t50.2886-16/clip_full.mp4";

    #[test]
    fn srcset_widest_entry_wins() {
        let img = ImgElement {
            src: Some(format!("{CDN_IMG}?w=640")),
            srcset: Some(format!(
                "{CDN_IMG}?w=640 640w, {CDN_IMG}?w=1080 1080w, {CDN_IMG}?w=320 320w"
            )),
            post_link: None,
        };
        let records = scan_elements(&[img], &[]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url.clone().unwrap(), format!("{CDN_IMG}?w=1080"));
    }

    #[test]
    fn plain_src_fallback_when_no_srcset() {
        let img = ImgElement {
            src: Some(CDN_IMG.to_string()),
            srcset: None,
            post_link: None,
        };
        let records = scan_elements(&[img], &[]);
        assert_eq!(records[0].url.as_deref(), Some(CDN_IMG));
    }

    #[test]
    fn classifier_filters_scanner_output() {
        let img = ImgElement {
            src: Some("https://static.cdninstagram.com/rsrc.php/icon_sprite_big.png".to_string()),
            srcset: None,
            post_link: None,
        };
        assert!(scan_elements(&[img], &[]).is_empty());
    }

    #[test]
    fn video_sources_and_poster() {
        let video = VideoElement {
            src: Some(CDN_VID.to_string()),
            poster: Some(CDN_IMG.to_string()),
            sources: vec![format!("{CDN_VID}?alt=1")],
            post_link: Some(PostLink::new("/p/VidPost99/", 0.0, 0.0)),
        };
        let records = scan_elements(&[], &[video]);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.kind == MediaKind::Video));
        assert!(records.iter().all(|r| r.thumbnail_url.as_deref() == Some(CDN_IMG)));
        assert!(records.iter().all(|r| r.source_id.as_deref() == Some("VidPost99")));
    }

    #[test]
    fn poster_only_video_needs_an_identity() {
        let anonymous = VideoElement {
            poster: Some(CDN_IMG.to_string()),
            ..Default::default()
        };
        assert!(scan_elements(&[], &[anonymous]).is_empty());

        let linked = VideoElement {
            poster: Some(CDN_IMG.to_string()),
            post_link: Some(PostLink::new("/reel/OnlyPoster1/", 0.0, 0.0)),
            ..Default::default()
        };
        let records = scan_elements(&[], &[linked]);
        assert_eq!(records.len(), 1);
        assert!(records[0].url.is_none());
        assert_eq!(records[0].source_id.as_deref(), Some("OnlyPoster1"));
    }

    #[test]
    fn script_text_finds_escaped_video_urls() {
        let text = r#"{"video_url":"https:\/\/scontent.cdninstagram.com\/v\/t50.2886-16\/clip_full.mp4?efg=abc&oh=1"}"#;
        let records = scan_script_text(text);
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].url.as_deref(),
            Some("https://scontent.cdninstagram.com/v/t50.2886-16/clip_full.mp4?efg=abc&oh=1")
        );
    }

    #[test]
    fn script_text_ignores_foreign_and_image_urls() {
        let text = r#"{"url":"https://example.org/elsewhere/video/clip.mp4","other":"https://scontent.cdninstagram.com/v/t51.29350-15/photo_full.jpg"}"#;
        assert!(scan_script_text(text).is_empty());
    }
}
