//! Listing-URL classification
//!
//! Article candidates harvested from an index page frequently include links
//! to other index pages: pagination, section hubs, tag and archive pages.
//! Those must never become feed items. Classification runs in two layers:
//! generic structural heuristics that hold across sites, and per-source
//! regex overrides from the configuration for sites the heuristics misjudge.

use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Path prefixes that mark two-segment URLs as section hubs
const SECTION_PREFIXES: &[&str] = &[
    "news",
    "novosti",
    "lenta",
    "tema",
    "topics",
    "press",
    "press-center",
    "press-tsentr",
];

/// Path segments that mark a URL as a listing wherever they appear
const LISTING_SEGMENTS: &[&str] = &["tag", "category", "archive", "search", "page"];

/// Compiled per-source classification overrides
///
/// `allow` patterns force a URL to count as an article even when the generic
/// heuristics would call it a listing; `listing` patterns force the opposite.
/// Overrides win over heuristics, and `listing` wins over `allow`.
pub struct UrlFilters {
    allow: Vec<Regex>,
    listing: Vec<Regex>,
}

impl UrlFilters {
    /// Compiles override patterns
    ///
    /// # Arguments
    ///
    /// * `allow_patterns` - Regexes matching URLs that are always articles
    /// * `listing_patterns` - Regexes matching URLs that are always listings
    pub fn from_patterns(
        allow_patterns: &[String],
        listing_patterns: &[String],
    ) -> Result<Self, ConfigError> {
        Ok(UrlFilters {
            allow: compile_all(allow_patterns)?,
            listing: compile_all(listing_patterns)?,
        })
    }

    /// Compiles the run-wide overrides used for merge and baseline checks
    ///
    /// Merging sees items from every source at once, so it must honor the
    /// union of all per-source overrides: an article a source admitted via
    /// its `allow-patterns` would otherwise be reclassified as a listing and
    /// silently dropped from the feed.
    pub fn from_config(config: &crate::config::Config) -> Result<Self, ConfigError> {
        let mut allow: Vec<String> = Vec::new();
        let mut listing: Vec<String> = config.filters.listing_patterns.clone();
        for source in &config.sources {
            allow.extend(source.allow_patterns.iter().cloned());
            listing.extend(source.listing_patterns.iter().cloned());
        }
        Self::from_patterns(&allow, &listing)
    }

    /// Filters with no overrides; heuristics only
    pub fn empty() -> Self {
        UrlFilters {
            allow: Vec::new(),
            listing: Vec::new(),
        }
    }

    /// Classifies a URL, overrides first
    pub fn is_listing_url(&self, url: &str) -> bool {
        if self.listing.iter().any(|re| re.is_match(url)) {
            return true;
        }
        if self.allow.iter().any(|re| re.is_match(url)) {
            return false;
        }
        is_listing_url(url)
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| ConfigError::InvalidPattern(format!("{}: {}", p, e)))
        })
        .collect()
}

/// Generic heuristic classification of index/hub/pagination URLs
///
/// Returns `true` when the URL structurally looks like a page that lists
/// articles rather than being one. Unparseable URLs classify as articles so
/// the caller's candidate filters decide their fate.
pub fn is_listing_url(url: &str) -> bool {
    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(_) => return false,
    };

    let segments: Vec<String> = parsed
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect();

    if let Some(last) = segments.last() {
        if last == "news" {
            return true;
        }
    }

    // section hub: /news/politics/ but not /news/2024/05/item
    if segments.len() == 2
        && SECTION_PREFIXES.contains(&segments[0].as_str())
        && !segments[1].chars().all(|c| c.is_ascii_digit())
    {
        return true;
    }

    if segments
        .iter()
        .any(|s| LISTING_SEGMENTS.contains(&s.as_str()))
    {
        return true;
    }

    for (key, value) in parsed.query_pairs() {
        if key.eq_ignore_ascii_case("page") && is_numeric(&value) {
            return true;
        }
        if is_pagen_key(&key) && is_numeric(&value) {
            return true;
        }
        if key.eq_ignore_ascii_case("vote_id") && is_numeric(&value) {
            return true;
        }
    }

    false
}

/// Bitrix pagination keys: PAGEN_1, PAGEN_2, ...
fn is_pagen_key(key: &str) -> bool {
    let upper = key.to_ascii_uppercase();
    match upper.strip_prefix("PAGEN_") {
        Some(rest) => !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

fn is_numeric(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_news_segment_is_listing() {
        assert!(is_listing_url("https://example.com/news"));
        assert!(is_listing_url("https://example.com/news/"));
        assert!(is_listing_url("https://example.com/ru/press/news/"));
    }

    #[test]
    fn test_section_hub_is_listing() {
        assert!(is_listing_url("https://example.com/news/politics/"));
        assert!(is_listing_url("https://example.com/press-tsentr/novosti"));
        assert!(is_listing_url("https://example.com/tema/economy/"));
    }

    #[test]
    fn test_deep_article_path_is_not_listing() {
        assert!(!is_listing_url(
            "https://example.com/news/2024/05/new-bridge-opens"
        ));
        assert!(!is_listing_url(
            "https://example.com/politics/2024/some-article.html"
        ));
    }

    #[test]
    fn test_numeric_second_segment_is_not_hub() {
        // /news/123456 is an article id, not a section
        assert!(!is_listing_url("https://example.com/news/837261"));
    }

    #[test]
    fn test_listing_segments() {
        assert!(is_listing_url("https://example.com/tag/housing/"));
        assert!(is_listing_url("https://example.com/blog/category/metro/"));
        assert!(is_listing_url("https://example.com/archive/2023/"));
        assert!(is_listing_url("https://example.com/search?q=metro"));
        assert!(is_listing_url("https://example.com/articles/page/3/"));
    }

    #[test]
    fn test_page_query_numeric_only() {
        assert!(is_listing_url("https://example.com/list?page=2"));
        assert!(!is_listing_url("https://example.com/list?page=two"));
        assert!(!is_listing_url("https://example.com/list?page="));
    }

    #[test]
    fn test_bitrix_pagination() {
        assert!(is_listing_url("https://example.com/n/?PAGEN_1=4"));
        assert!(is_listing_url("https://example.com/n/?PAGEN_2=10"));
        assert!(!is_listing_url("https://example.com/n/?PAGEN_1=abc"));
    }

    #[test]
    fn test_vote_id_numeric_only() {
        assert!(is_listing_url("https://example.com/poll?VOTE_ID=7"));
        assert!(!is_listing_url("https://example.com/poll?VOTE_ID=x7"));
    }

    #[test]
    fn test_plain_article_query_is_not_listing() {
        assert!(!is_listing_url("https://example.com/item.php?id=991"));
    }

    #[test]
    fn test_allow_pattern_overrides_heuristics() {
        let filters = UrlFilters::from_patterns(
            &[r"^https://special\.example\.com/news/[a-z0-9-]+/?$".to_string()],
            &[],
        )
        .unwrap();

        // generic rule calls two-segment /news/<slug> a hub
        assert!(is_listing_url("https://special.example.com/news/big-story"));
        assert!(!filters.is_listing_url("https://special.example.com/news/big-story"));
    }

    #[test]
    fn test_listing_pattern_overrides_allow() {
        let filters = UrlFilters::from_patterns(
            &[r"example\.com/news/".to_string()],
            &[r"/news/index\.php$".to_string()],
        )
        .unwrap();

        assert!(filters.is_listing_url("https://example.com/news/index.php"));
        assert!(!filters.is_listing_url("https://example.com/news/2024/item"));
    }

    #[test]
    fn test_from_config_unions_per_source_overrides() {
        let config: crate::config::Config = toml::from_str(
            r#"
[feed]
title = "t"
home-page-url = "https://example.com/"
feed-url = "https://example.com/unified.json"

[paths]
feed-path = "docs/unified.json"
state-path = ".cache/state.json"
page-cache-dir = ".cache/pages"

[filters]
listing-patterns = ["/global-hub/"]

[[source]]
name = "Special"
slug = "special"
url = "https://special.example.com/news/"
allow-patterns = ["^https://special\\.example\\.com/news/[a-z0-9-]+/?$"]
listing-patterns = ["/vote/"]
"#,
        )
        .unwrap();

        let filters = UrlFilters::from_config(&config).unwrap();
        assert!(!filters.is_listing_url("https://special.example.com/news/big-story"));
        assert!(filters.is_listing_url("https://special.example.com/vote/1"));
        assert!(filters.is_listing_url("https://other.example.com/global-hub/x"));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        assert!(UrlFilters::from_patterns(&["([".to_string()], &[]).is_err());
    }
}
