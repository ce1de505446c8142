//! Durable crawl state
//!
//! Everything the harvester must remember between runs lives in one
//! serializable root document: per-URL conditional headers, per-source index
//! hashes and seen-URL windows, per-host cookies and failure counters, the
//! first-seen fallback map and aggregate run statistics. The document is
//! loaded once at startup and written atomically at checkpoints; a missing
//! or corrupt file degrades to a fresh state rather than failing the run.

use crate::fetch::cookies::CookieRecord;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::warn;

/// ETag / Last-Modified validators remembered per URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalHeaders {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl ConditionalHeaders {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// Consecutive-failure bookkeeping per host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailureRecord {
    #[serde(default)]
    pub consecutive: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_timestamp_ms: Option<i64>,
}

/// Timings and outcome of the most recent request to a host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_ms: Option<f64>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-host operational state, created lazily on first use of a host
///
/// Persists across runs; cookies are replayed into every new session and
/// only an explicit session invalidation clears them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostState {
    #[serde(default)]
    pub cookies: Vec<CookieRecord>,
    #[serde(default)]
    pub warmup_done: bool,
    #[serde(default)]
    pub failures: FailureRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success_path: Option<String>,
    #[serde(default)]
    pub metrics: RequestMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warmup_result: Option<String>,
}

impl HostState {
    pub fn record_success(&mut self, path: Option<String>) {
        self.failures.consecutive = 0;
        self.failures.last_error = None;
        if let Some(path) = path {
            self.last_success_path = Some(path);
        }
    }

    pub fn record_failure(&mut self, reason: &str) {
        self.failures.consecutive += 1;
        self.failures.last_error = Some(reason.to_string());
        self.failures.last_timestamp_ms = Some(Utc::now().timestamp_millis());
    }
}

/// Per-source crawl state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceState {
    /// Content hash of the last-seen listing body, drives the unchanged-skip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_hash: Option<String>,
    /// Sliding window of recently processed article URLs, newest first
    #[serde(default)]
    pub seen_urls: Vec<String>,
    /// While in the future the source is skipped unless a cached listing exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl SourceState {
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        matches!(self.cooldown_until, Some(until) if until > now)
    }

    /// Rebuilds the seen window after a harvest
    ///
    /// New URLs go first, then previously seen URLs that still appear in the
    /// current candidate list, truncated to the cap. Stale history that fell
    /// off the listing is dropped so the window tracks the listing instead of
    /// growing forever.
    pub fn update_seen(&mut self, new_urls: &[String], current_candidates: &[String], cap: usize) {
        let mut window: Vec<String> = new_urls.to_vec();
        for url in &self.seen_urls {
            if window.len() >= cap {
                break;
            }
            if current_candidates.iter().any(|c| c == url) && !window.contains(url) {
                window.push(url.clone());
            }
        }
        window.truncate(cap);
        self.seen_urls = window;
    }
}

/// One recorded harvest error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    pub source: String,
    pub url: String,
    pub error: String,
}

/// One recorded per-source skip with its reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSkip {
    pub source: String,
    pub reason: String,
}

/// Aggregate statistics for the last completed run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub item_count: usize,
    /// Hash of the configuration the last run used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
    #[serde(default)]
    pub errors: Vec<RunError>,
    /// Sources skipped this run and why (cooldown, unchanged listing)
    #[serde(default)]
    pub skips: Vec<RunSkip>,
}

/// The serializable root of all durable crawl state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlState {
    /// Conditional-GET validators keyed by URL
    #[serde(default)]
    pub conditional: HashMap<String, ConditionalHeaders>,
    /// Per-source state keyed by source slug
    #[serde(default)]
    pub sources: HashMap<String, SourceState>,
    /// Per-host operational state keyed by host name
    #[serde(default)]
    pub hosts: HashMap<String, HostState>,
    /// First-seen fallback timestamps keyed by item id, write-once
    #[serde(default)]
    pub first_seen: HashMap<String, String>,
    #[serde(default)]
    pub stats: RunStats,
}

impl CrawlState {
    /// Loads state from disk, falling back to a fresh default
    ///
    /// A missing file is the normal first-run case; a corrupt file is logged
    /// and replaced rather than aborting the run, since losing incremental
    /// state only costs one full re-crawl.
    pub fn load(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return CrawlState::default(),
        };
        match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(e) => {
                warn!("Failed to parse crawl state {}: {}, starting fresh", path.display(), e);
                CrawlState::default()
            }
        }
    }

    /// Writes the state atomically: serialize to a sibling temp file, rename
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serialized)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn source_mut(&mut self, slug: &str) -> &mut SourceState {
        self.sources.entry(slug.to_string()).or_default()
    }

    pub fn host_mut(&mut self, host: &str) -> &mut HostState {
        self.hosts.entry(host.to_string()).or_default()
    }

    pub fn conditional_for(&self, url: &str) -> ConditionalHeaders {
        self.conditional.get(url).cloned().unwrap_or_default()
    }

    pub fn set_conditional(&mut self, url: &str, headers: ConditionalHeaders) {
        if headers.is_empty() {
            self.conditional.remove(url);
        } else {
            self.conditional.insert(url.to_string(), headers);
        }
    }

    /// Returns the first-seen fallback for an id, recording `now` on first sight
    pub fn first_seen_or_insert(&mut self, id: &str, now: &str) -> String {
        self.first_seen
            .entry(id.to_string())
            .or_insert_with(|| now.to_string())
            .clone()
    }

    pub fn record_error(&mut self, source: &str, url: &str, error: &str) {
        self.stats.errors.push(RunError {
            source: source.to_string(),
            url: url.to_string(),
            error: error.to_string(),
        });
    }

    pub fn record_skip(&mut self, source: &str, reason: &str) {
        self.stats.skips.push(RunSkip {
            source: source.to_string(),
            reason: reason.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_is_fresh() {
        let dir = TempDir::new().unwrap();
        let state = CrawlState::load(&dir.path().join("absent.json"));
        assert!(state.sources.is_empty());
        assert!(state.first_seen.is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_fresh() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json at all").unwrap();
        let state = CrawlState::load(&path);
        assert!(state.sources.is_empty());
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let mut state = CrawlState::default();
        state.source_mut("minstroy").index_hash = Some("abc".to_string());
        state
            .source_mut("minstroy")
            .seen_urls
            .push("https://example.com/1".to_string());
        state.host_mut("example.com").warmup_done = true;
        state.set_conditional(
            "https://example.com/news",
            ConditionalHeaders {
                etag: Some("\"v1\"".to_string()),
                last_modified: None,
            },
        );
        state.save(&path).unwrap();

        let reloaded = CrawlState::load(&path);
        assert_eq!(
            reloaded.sources["minstroy"].index_hash.as_deref(),
            Some("abc")
        );
        assert!(reloaded.hosts["example.com"].warmup_done);
        assert_eq!(
            reloaded
                .conditional_for("https://example.com/news")
                .etag
                .as_deref(),
            Some("\"v1\"")
        );
    }

    #[test]
    fn test_first_seen_is_write_once() {
        let mut state = CrawlState::default();
        let first = state.first_seen_or_insert("id-1", "2026-01-01T00:00:00+03:00");
        let second = state.first_seen_or_insert("id-1", "2026-02-02T00:00:00+03:00");
        assert_eq!(first, "2026-01-01T00:00:00+03:00");
        assert_eq!(second, first);
    }

    #[test]
    fn test_cooldown_window() {
        let mut state = SourceState::default();
        let now = Utc::now();
        assert!(!state.in_cooldown(now));

        state.cooldown_until = Some(now + Duration::hours(6));
        assert!(state.in_cooldown(now));
        assert!(!state.in_cooldown(now + Duration::hours(7)));
    }

    #[test]
    fn test_seen_window_bounded() {
        let mut state = SourceState::default();
        let candidates: Vec<String> = (0..700)
            .map(|i| format!("https://example.com/news/{}", i))
            .collect();

        // many harvests, each adding a slice of new URLs
        for chunk in candidates.chunks(50) {
            state.update_seen(chunk, &candidates, 500);
            assert!(state.seen_urls.len() <= 500);
        }
        assert_eq!(state.seen_urls.len(), 500);
    }

    #[test]
    fn test_seen_window_drops_urls_gone_from_listing() {
        let mut state = SourceState::default();
        state.seen_urls = vec![
            "https://example.com/old-1".to_string(),
            "https://example.com/old-2".to_string(),
        ];

        let candidates = vec![
            "https://example.com/new-1".to_string(),
            "https://example.com/old-2".to_string(),
        ];
        state.update_seen(&["https://example.com/new-1".to_string()], &candidates, 500);

        assert_eq!(
            state.seen_urls,
            vec![
                "https://example.com/new-1".to_string(),
                "https://example.com/old-2".to_string(),
            ]
        );
    }

    #[test]
    fn test_failure_counter() {
        let mut host = HostState::default();
        host.record_failure("timeout");
        host.record_failure("timeout");
        assert_eq!(host.failures.consecutive, 2);

        host.record_success(Some("/news".to_string()));
        assert_eq!(host.failures.consecutive, 0);
        assert!(host.failures.last_error.is_none());
        assert_eq!(host.last_success_path.as_deref(), Some("/news"));
    }
}
