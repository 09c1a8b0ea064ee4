//! Response shape parser.
//!
//! The host site's internal API answers the same logical question (what
//! media does this post carry) in half a dozen envelope formats: saved-feed
//! items, GraphQL sidecars, reels trays, XDT connections, bare arrays,
//! single-post payloads. None of them are documented and all of them drift,
//! so this is a guarded recursive walk with independent shape recognizers
//! rather than a schema. A recognizer that misses a node costs nothing —
//! another recognizer, or the defensive probe, gets a chance at it.
//!
//! Only leaf image/video records come out. Carousel containers are expanded
//! into their children, which inherit the parent's identifying context.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::trace;

use feedvault_common::{MediaKind, MediaRecord};

/// Recursion cap. API payloads nest 6-10 levels; anything deeper is
/// pathological and gets abandoned with whatever was found above it.
pub const DEFAULT_DEPTH_CAP: usize = 20;

const MEDIA_TYPE_IMAGE: i64 = 1;
const MEDIA_TYPE_VIDEO: i64 = 2;
const MEDIA_TYPE_CAROUSEL: i64 = 8;

/// Wrapper keys whose payload is the interesting part.
const WRAPPER_KEYS: [&str; 5] = [
    "items",
    "data",
    "graphql",
    "shortcode_media",
    "xdt_shortcode_media",
];

/// Identifying fields passed down from containers so carousel children and
/// wrapped nodes inherit context their own object lacks.
#[derive(Debug, Clone, Default)]
struct Inherited {
    source_id: Option<String>,
    post_url: Option<String>,
    author: Option<String>,
    caption: Option<String>,
    like_count: Option<i64>,
    comment_count: Option<i64>,
    taken_at: Option<DateTime<Utc>>,
    carousel_index: Option<u32>,
}

/// Extract all leaf media records from an arbitrary decoded JSON value.
/// Never fails: unrecognized or malformed shapes contribute zero records.
pub fn parse(value: &Value) -> Vec<MediaRecord> {
    parse_with_depth(value, DEFAULT_DEPTH_CAP)
}

pub fn parse_with_depth(value: &Value, depth_cap: usize) -> Vec<MediaRecord> {
    let mut out = Vec::new();
    walk(value, &Inherited::default(), 0, depth_cap, &mut out);
    out
}

fn walk(value: &Value, ctx: &Inherited, depth: usize, cap: usize, out: &mut Vec<MediaRecord>) {
    if depth > cap {
        trace!(depth, "parser depth cap reached, abandoning subtree");
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                walk(item, ctx, depth + 1, cap, out);
            }
        }
        Value::Object(map) => walk_object(map, ctx, depth, cap, out),
        _ => {}
    }
}

fn walk_object(
    map: &Map<String, Value>,
    parent: &Inherited,
    depth: usize,
    cap: usize,
    out: &mut Vec<MediaRecord>,
) {
    let ctx = local_context(map, parent);

    let media_type = map.get("media_type").and_then(Value::as_i64);
    let is_video = media_type == Some(MEDIA_TYPE_VIDEO)
        || map.get("is_video").and_then(Value::as_bool).unwrap_or(false)
        || map.contains_key("video_versions")
        || map.contains_key("video_url");

    let children = carousel_children(map);
    let is_carousel = media_type == Some(MEDIA_TYPE_CAROUSEL) || children.is_some();

    let mut recognized = false;

    // Carousel: expand children with 1-based positions, never the container.
    if let Some(children) = children {
        recognized = true;
        for (i, child) in children.into_iter().enumerate() {
            let child_ctx = Inherited {
                carousel_index: Some(i as u32 + 1),
                ..ctx.clone()
            };
            walk(child, &child_ctx, depth + 1, cap, out);
        }
    }

    if !is_carousel {
        if is_video {
            recognized = true;
            if let Some(record) = video_record(map, &ctx) {
                out.push(record);
            }
        } else if map.contains_key("image_versions2") || map.contains_key("display_url") {
            // A present media_type must agree; absent means trust the shape.
            if media_type.is_none() || media_type == Some(MEDIA_TYPE_IMAGE) {
                recognized = true;
                if let Some(record) = image_record(map, &ctx) {
                    out.push(record);
                }
            }
        }
    }

    // Known wrappers.
    for key in WRAPPER_KEYS {
        if let Some(payload) = map.get(key) {
            recognized = true;
            walk(payload, &ctx, depth + 1, cap, out);
        }
    }

    // GraphQL connections: top-level `edges` plus any `edge_*` key carrying
    // an edges array. The sidecar connection was already expanded above.
    if let Some(edges) = map.get("edges").and_then(Value::as_array) {
        recognized = true;
        walk_edges(edges, &ctx, depth, cap, out);
    }
    for (key, value) in map {
        if key.starts_with("edge_") && key != "edge_sidecar_to_children" {
            if let Some(edges) = value.get("edges").and_then(Value::as_array) {
                recognized = true;
                walk_edges(edges, &ctx, depth, cap, out);
            }
        }
    }

    // Defensive probe: only when nothing above consumed this node, so a
    // recognized shape is never double-counted through its own keys.
    if !recognized {
        for value in map.values() {
            if matches!(value, Value::Object(_) | Value::Array(_)) {
                walk(value, &ctx, depth + 1, cap, out);
            }
        }
    }
}

fn walk_edges(
    edges: &[Value],
    ctx: &Inherited,
    depth: usize,
    cap: usize,
    out: &mut Vec<MediaRecord>,
) {
    for edge in edges {
        if let Some(node) = edge.get("node") {
            walk(node, ctx, depth + 1, cap, out);
        }
    }
}

// --- Record builders ---

fn video_record(map: &Map<String, Value>, ctx: &Inherited) -> Option<MediaRecord> {
    let url = best_video_variant(map.get("video_versions"))
        .or_else(|| string_field(map, "video_url"));
    let thumbnail = best_image_candidate(map).or_else(|| string_field(map, "display_url"));

    // A video with no URL is still worth a record when something can
    // identify it for later backfill.
    if url.is_none() && thumbnail.is_none() && ctx.source_id.is_none() && ctx.post_url.is_none() {
        return None;
    }

    let mut record = MediaRecord::new(MediaKind::Video);
    record.url = url;
    record.thumbnail_url = thumbnail;
    apply_context(&mut record, ctx);
    Some(record)
}

fn image_record(map: &Map<String, Value>, ctx: &Inherited) -> Option<MediaRecord> {
    let url = best_image_candidate(map).or_else(|| string_field(map, "display_url"))?;
    let mut record = MediaRecord::new(MediaKind::Image);
    record.url = Some(url);
    apply_context(&mut record, ctx);
    Some(record)
}

/// Highest width×height variant wins; the first variant seen keeps priority
/// under equal area.
fn best_video_variant(value: Option<&Value>) -> Option<String> {
    let variants = value?.as_array()?;
    let mut best_url: Option<&str> = None;
    let mut best_area = 0i64;
    for variant in variants {
        let Some(url) = variant.get("url").and_then(Value::as_str) else {
            continue;
        };
        let area = variant.get("width").and_then(Value::as_i64).unwrap_or(0)
            * variant.get("height").and_then(Value::as_i64).unwrap_or(0);
        if best_url.is_none() || area > best_area {
            best_url = Some(url);
            best_area = area;
        }
    }
    best_url.map(String::from)
}

/// Highest-width candidate among `image_versions2.candidates`.
fn best_image_candidate(map: &Map<String, Value>) -> Option<String> {
    let candidates = map
        .get("image_versions2")?
        .get("candidates")?
        .as_array()?;
    let mut best_url: Option<&str> = None;
    let mut best_width = 0i64;
    for candidate in candidates {
        let Some(url) = candidate.get("url").and_then(Value::as_str) else {
            continue;
        };
        let width = candidate.get("width").and_then(Value::as_i64).unwrap_or(0);
        if best_url.is_none() || width > best_width {
            best_url = Some(url);
            best_width = width;
        }
    }
    best_url.map(String::from)
}

// --- Context extraction ---

fn local_context(map: &Map<String, Value>, parent: &Inherited) -> Inherited {
    let source_id = string_field(map, "code")
        .or_else(|| string_field(map, "shortcode"))
        .or_else(|| parent.source_id.clone());
    let post_url = source_id
        .as_deref()
        .map(|code| format!("https://www.instagram.com/p/{code}/"))
        .or_else(|| parent.post_url.clone());
    let author = nested_str(map, "user", "username")
        .or_else(|| nested_str(map, "owner", "username"))
        .or_else(|| parent.author.clone());
    let caption = caption_text(map).or_else(|| parent.caption.clone());
    let like_count = map
        .get("like_count")
        .and_then(Value::as_i64)
        .or_else(|| nested_count(map, "edge_liked_by"))
        .or_else(|| nested_count(map, "edge_media_preview_like"))
        .or(parent.like_count);
    let comment_count = map
        .get("comment_count")
        .and_then(Value::as_i64)
        .or_else(|| nested_count(map, "edge_media_to_comment"))
        .or(parent.comment_count);
    let taken_at = map
        .get("taken_at")
        .or_else(|| map.get("taken_at_timestamp"))
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .or(parent.taken_at);

    Inherited {
        source_id,
        post_url,
        author,
        caption,
        like_count,
        comment_count,
        taken_at,
        carousel_index: parent.carousel_index,
    }
}

fn caption_text(map: &Map<String, Value>) -> Option<String> {
    match map.get("caption") {
        Some(Value::String(text)) => return Some(text.clone()),
        Some(Value::Object(caption)) => {
            return caption.get("text").and_then(Value::as_str).map(String::from)
        }
        _ => {}
    }
    map.get("edge_media_to_caption")
        .and_then(|c| c.get("edges"))
        .and_then(Value::as_array)
        .and_then(|edges| edges.first())
        .and_then(|edge| edge.get("node"))
        .and_then(|node| node.get("text"))
        .and_then(Value::as_str)
        .map(String::from)
}

fn apply_context(record: &mut MediaRecord, ctx: &Inherited) {
    record.source_id = ctx.source_id.clone();
    record.post_url = ctx.post_url.clone();
    record.carousel_index = ctx.carousel_index;
    record.author = ctx.author.clone();
    record.caption = ctx.caption.clone();
    record.like_count = ctx.like_count;
    record.comment_count = ctx.comment_count;
    record.taken_at = ctx.taken_at;
}

fn carousel_children(map: &Map<String, Value>) -> Option<Vec<&Value>> {
    if let Some(children) = map.get("carousel_media").and_then(Value::as_array) {
        return Some(children.iter().collect());
    }
    let edges = map
        .get("edge_sidecar_to_children")?
        .get("edges")?
        .as_array()?;
    Some(edges.iter().filter_map(|edge| edge.get("node")).collect())
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(String::from)
}

fn nested_str(map: &Map<String, Value>, outer: &str, inner: &str) -> Option<String> {
    map.get(outer)?.get(inner)?.as_str().map(String::from)
}

fn nested_count(map: &Map<String, Value>, key: &str) -> Option<i64> {
    map.get(key)?.get("count")?.as_i64()
}
