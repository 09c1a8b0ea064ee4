use std::env;

/// Capture tuning loaded from environment variables. Every knob has a
/// default matching observed behavior on the target site; the env overrides
/// exist for tuning a deployment without a rebuild.
#[derive(Debug, Clone)]
pub struct Config {
    /// Consecutive unchanged page-height checks before auto-scroll stops.
    pub scroll_stability_checks: u32,
    /// Pause between scroll steps, milliseconds.
    pub scroll_interval_ms: u64,
    /// Maximum "next" clicks when paging through one carousel.
    pub carousel_page_cap: u32,
    /// Jitter range between posts, milliseconds.
    pub post_delay_min_ms: u64,
    pub post_delay_max_ms: u64,
    /// Jitter range between carousel pages, milliseconds. Tighter than the
    /// between-post range — paging within one modal is lower-risk.
    pub carousel_delay_min_ms: u64,
    pub carousel_delay_max_ms: u64,
    /// Attempts to re-locate a post link before skipping it.
    pub locate_retries: u32,
    /// Attempts to see the detail view after an open interaction.
    pub modal_open_retries: u32,
    /// Recursion cap for the response shape parser.
    pub parse_depth_cap: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scroll_stability_checks: 8,
            scroll_interval_ms: 1500,
            carousel_page_cap: 10,
            post_delay_min_ms: 1500,
            post_delay_max_ms: 3500,
            carousel_delay_min_ms: 400,
            carousel_delay_max_ms: 900,
            locate_retries: 5,
            modal_open_retries: 10,
            parse_depth_cap: 20,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            scroll_stability_checks: env_or("FV_SCROLL_STABILITY_CHECKS", defaults.scroll_stability_checks),
            scroll_interval_ms: env_or("FV_SCROLL_INTERVAL_MS", defaults.scroll_interval_ms),
            carousel_page_cap: env_or("FV_CAROUSEL_PAGE_CAP", defaults.carousel_page_cap),
            post_delay_min_ms: env_or("FV_POST_DELAY_MIN_MS", defaults.post_delay_min_ms),
            post_delay_max_ms: env_or("FV_POST_DELAY_MAX_MS", defaults.post_delay_max_ms),
            carousel_delay_min_ms: env_or("FV_CAROUSEL_DELAY_MIN_MS", defaults.carousel_delay_min_ms),
            carousel_delay_max_ms: env_or("FV_CAROUSEL_DELAY_MAX_MS", defaults.carousel_delay_max_ms),
            locate_retries: env_or("FV_LOCATE_RETRIES", defaults.locate_retries),
            modal_open_retries: env_or("FV_MODAL_OPEN_RETRIES", defaults.modal_open_retries),
            parse_depth_cap: env_or("FV_PARSE_DEPTH_CAP", defaults.parse_depth_cap),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number, got {raw:?}")),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert!(config.post_delay_min_ms <= config.post_delay_max_ms);
        assert!(config.carousel_delay_min_ms <= config.carousel_delay_max_ms);
        // Between-post pacing must be wider than carousel pacing.
        assert!(config.post_delay_min_ms > config.carousel_delay_max_ms);
        assert!(config.scroll_stability_checks > 0);
        assert!(config.parse_depth_cap >= 15);
    }
}
