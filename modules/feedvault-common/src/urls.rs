//! URL classification and identity normalization.
//!
//! Classification is a recall filter over the host site's CDN naming, not a
//! grammar: over-matching on the feed page is cheap, so the checks are plain
//! substring tests. Normalization exists only for dedup — the original URL,
//! signed query string and all, is what gets stored and downloaded.

/// Heuristic floor for a real CDN URL. Anything shorter is an icon, a
/// relative path, or junk.
const MIN_MEDIA_URL_LEN: usize = 30;

/// CDN host markers for the target site.
const CDN_HOST_MARKERS: [&str; 4] = ["instagram", "cdninstagram", "fbcdn", "scontent"];

/// Static-asset subdomain — sprites, icons, never post media.
const STATIC_ASSET_HOST: &str = "static.cdninstagram.com";

/// Fixed-size thumbnail path tokens (profile pics, grid previews).
const THUMBNAIL_SIZE_TOKENS: [&str; 7] = [
    "/s44x44/", "/s64x64/", "/s88x88/", "/s100x100/", "/s132x132/", "/s150x150/", "/s320x320/",
];

/// Profile-picture storage path signature.
const PROFILE_PIC_SIGNATURE: &str = "t51.2885-19";

/// Whether a URL plausibly points at full-size post media on the site's CDN.
pub fn is_candidate_media_url(url: &str) -> bool {
    if url.len() < MIN_MEDIA_URL_LEN {
        return false;
    }
    if url.starts_with("blob:") || url.starts_with("data:") {
        return false;
    }
    if url.contains(STATIC_ASSET_HOST) {
        return false;
    }
    if THUMBNAIL_SIZE_TOKENS.iter().any(|t| url.contains(t)) {
        return false;
    }
    if url.contains(PROFILE_PIC_SIGNATURE) {
        return false;
    }
    CDN_HOST_MARKERS.iter().any(|m| url.contains(m))
}

/// Whether a URL points at a video resource.
pub fn is_video_url(url: &str) -> bool {
    if url.contains(".mp4") {
        return true;
    }
    url.contains("video") && is_candidate_media_url(url)
}

/// Identity form of a URL: scheme + host + path, query dropped. The CDN
/// rotates signature parameters between responses, so two sightings of the
/// same resource differ only in query string.
pub fn normalize(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => format!(
            "{}://{}{}",
            parsed.scheme(),
            parsed.host_str().unwrap_or_default(),
            parsed.path()
        ),
        // Not a parseable URL — naive truncation at the query marker.
        Err(_) => url.split('?').next().unwrap_or(url).to_string(),
    }
}
