//! Export and import of the captured collection.
//!
//! Three export shapes: a plain URL list for feeding downloaders, CSV for
//! spreadsheets, and the full JSON snapshot for lossless backup. Import
//! accepts the URL-list shape back, classifying each line by URL.

use anyhow::{Context, Result};
use chrono::Utc;

use feedvault_common::{urls, MediaKind, MediaRecord, MediaSnapshot};

/// One media URL per line, images first, records without a resolved URL
/// skipped.
pub fn to_url_list(snapshot: &MediaSnapshot) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for record in snapshot.images.iter().chain(snapshot.videos.iter()) {
        if let Some(url) = record.url.as_deref() {
            lines.push(url);
        }
    }
    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

const CSV_HEADER: &str = "kind,url,thumbnail_url,post_url,source_id,author,like_count,comment_count,captured_at";

pub fn to_csv(snapshot: &MediaSnapshot) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for record in snapshot.images.iter().chain(snapshot.videos.iter()) {
        let fields = [
            record.kind.to_string(),
            record.url.clone().unwrap_or_default(),
            record.thumbnail_url.clone().unwrap_or_default(),
            record.post_url.clone().unwrap_or_default(),
            record.source_id.clone().unwrap_or_default(),
            record.author.clone().unwrap_or_default(),
            record.like_count.map(|n| n.to_string()).unwrap_or_default(),
            record
                .comment_count
                .map(|n| n.to_string())
                .unwrap_or_default(),
            record.captured_at.to_rfc3339(),
        ];
        let row: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// Quote a field when it contains a delimiter, quote, or newline; embedded
/// quotes double per RFC 4180.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Full-fidelity JSON export; the exact document `import` of a backup or a
/// fresh install restores from.
pub fn to_json(snapshot: &MediaSnapshot) -> Result<String> {
    serde_json::to_string_pretty(snapshot).context("Failed to encode snapshot as JSON")
}

pub fn from_json(raw: &str) -> Result<MediaSnapshot> {
    serde_json::from_str(raw).context("Failed to decode snapshot JSON")
}

/// Parse a URL-list export back into records. Blank lines and `#` comments
/// are skipped; each URL is classified image/video by its shape.
pub fn import_url_list(text: &str) -> Vec<MediaRecord> {
    let now = Utc::now();
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let kind = if urls::is_video_url(line) {
                MediaKind::Video
            } else {
                MediaKind::Image
            };
            let mut record = MediaRecord::new(kind);
            record.url = Some(line.to_string());
            record.captured_at = now;
            record
        })
        .collect()
}
