use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for unifeed
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub feed: FeedConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceConfig>,
}

/// Published feed metadata and shape
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Feed title in the output document
    pub title: String,

    /// Home page advertised by the feed
    #[serde(rename = "home-page-url")]
    pub home_page_url: String,

    /// Self URL advertised by the feed
    #[serde(rename = "feed-url")]
    pub feed_url: String,

    /// Maximum number of items kept after a merge
    #[serde(rename = "max-items", default = "default_max_feed_items")]
    pub max_items: usize,

    /// Fixed civil timezone for all published dates, as an UTC offset
    #[serde(rename = "timezone-offset-hours", default = "default_tz_offset")]
    pub timezone_offset_hours: i32,
}

/// File-system locations for the run artifacts
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Path to the published feed document
    #[serde(rename = "feed-path")]
    pub feed_path: String,

    /// Path to the durable crawl-state document
    #[serde(rename = "state-path")]
    pub state_path: String,

    /// Directory holding cached page bodies
    #[serde(rename = "page-cache-dir")]
    pub page_cache_dir: String,
}

/// Global harvest behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
    /// Soft deadline for the whole run, checked between work items (seconds)
    #[serde(rename = "max-runtime-secs", default = "default_max_runtime")]
    pub max_runtime_secs: u64,

    /// Minimum delay between requests to the same host (milliseconds)
    #[serde(rename = "min-request-delay-ms", default = "default_min_delay")]
    pub min_request_delay_ms: u64,

    /// Random jitter added on top of the minimum delay (milliseconds)
    #[serde(rename = "jitter-ms", default = "default_jitter")]
    pub jitter_ms: u64,

    /// Size of the per-source seen-URL window
    #[serde(rename = "seen-window", default = "default_seen_window")]
    pub seen_window: usize,

    /// Cooldown applied to a source after repeated server-side failures (hours)
    #[serde(rename = "cooldown-hours", default = "default_cooldown_hours")]
    pub cooldown_hours: i64,

    /// Hard cap on candidate links taken from one listing
    #[serde(rename = "max-links-per-source", default = "default_max_links")]
    pub max_links_per_source: usize,

    /// Extracted article text shorter than this is treated as absent
    #[serde(rename = "min-content-len", default = "default_min_content_len")]
    pub min_content_len: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_runtime_secs: default_max_runtime(),
            min_request_delay_ms: default_min_delay(),
            jitter_ms: default_jitter(),
            seen_window: default_seen_window(),
            cooldown_hours: default_cooldown_hours(),
            max_links_per_source: default_max_links(),
            min_content_len: default_min_content_len(),
        }
    }
}

/// Global URL filtering knobs
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterConfig {
    /// Hosts where an accelerated-mobile variant may be appended to articles
    #[serde(rename = "amp-hosts", default)]
    pub amp_hosts: Vec<String>,

    /// Extra regexes classifying URLs as listing pages, applied to all sources
    #[serde(rename = "listing-patterns", default)]
    pub listing_patterns: Vec<String>,
}

/// Harvesting mode for a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceMode {
    /// Crawl a single listing page for article links
    Listing,
    /// Walk a paginated listing by appending a page parameter
    PagedApi,
}

impl Default for SourceMode {
    fn default() -> Self {
        SourceMode::Listing
    }
}

/// One harvested source
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Human-readable source name, recorded on every emitted item
    pub name: String,

    /// Stable identifier used for state and cache keys
    pub slug: String,

    /// Entry URL (listing page or paginated API root)
    pub url: String,

    #[serde(default)]
    pub mode: SourceMode,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Candidate links must match at least one of these regexes (if any)
    #[serde(rename = "include-patterns", default)]
    pub include_patterns: Vec<String>,

    /// Candidate links matching any of these regexes are dropped
    #[serde(rename = "exclude-patterns", default)]
    pub exclude_patterns: Vec<String>,

    /// URLs matching these regexes are never classified as listings
    #[serde(rename = "allow-patterns", default)]
    pub allow_patterns: Vec<String>,

    /// URLs matching these regexes are always classified as listings
    #[serde(rename = "listing-patterns", default)]
    pub listing_patterns: Vec<String>,

    /// Restrict candidates to the source's own host
    #[serde(rename = "restrict-domain", default)]
    pub restrict_domain: bool,

    /// Minimum anchor-text length for a link to count as an article
    #[serde(rename = "link-min-text-len", default = "default_link_min_text_len")]
    pub link_min_text_len: usize,

    /// Accept links whose anchor text is empty (title recovered from the page)
    #[serde(rename = "allow-empty-anchor", default)]
    pub allow_empty_anchor: bool,

    /// Fetch each article page for title/date/content
    #[serde(rename = "follow-detail", default = "default_true")]
    pub follow_detail: bool,

    /// CSS selectors tried in order for the article body
    #[serde(rename = "content-selectors", default)]
    pub content_selectors: Vec<String>,

    /// Per-source cap on emitted items
    #[serde(rename = "max-items", default = "default_source_max_items")]
    pub max_items: usize,

    /// Query parameter used to walk pages in paged-api mode
    #[serde(rename = "page-param", default)]
    pub page_param: Option<String>,

    /// Number of pages walked in paged-api mode
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Optional per-host fetch strategy override
    #[serde(default)]
    pub strategy: Option<StrategyConfig>,
}

/// Per-host request strategy, parsed verbatim from the source configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrategyConfig {
    #[serde(rename = "connect-timeout-secs", default)]
    pub connect_timeout_secs: Option<f64>,

    #[serde(rename = "read-timeout-secs", default)]
    pub read_timeout_secs: Option<f64>,

    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(rename = "backoff-factor", default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Proxy URLs used round-robin across attempts
    #[serde(default)]
    pub proxies: Vec<String>,

    /// Response statuses that trigger a session reset and retry
    #[serde(rename = "retry-statuses", default)]
    pub retry_statuses: Vec<u16>,

    /// Headers merged into every request for this host
    #[serde(rename = "extra-headers", default)]
    pub extra_headers: BTreeMap<String, String>,

    /// Warm-up request issued before the first real request
    #[serde(default)]
    pub warmup: Option<WarmupSection>,

    /// Allow headless-browser escalation when the warm-up is challenged
    #[serde(default)]
    pub escalate: bool,

    /// Persist cookies observed on responses into the host state
    #[serde(rename = "capture-cookies", default = "default_true")]
    pub capture_cookies: bool,

    /// Record the path of the last successful fetch (diagnostic)
    #[serde(rename = "record-path-on-success", default)]
    pub record_path_on_success: bool,
}

/// Warm-up recipe for bot-challenge hosts
#[derive(Debug, Clone, Deserialize)]
pub struct WarmupSection {
    /// URL fetched to establish a session; defaults to the requested URL
    #[serde(default)]
    pub url: Option<String>,

    /// Randomized pause after a successful warm-up (seconds)
    #[serde(rename = "delay-min-secs", default = "default_warmup_delay_min")]
    pub delay_min_secs: f64,

    #[serde(rename = "delay-max-secs", default = "default_warmup_delay_max")]
    pub delay_max_secs: f64,

    /// Warm-up specific timeout (seconds)
    #[serde(rename = "timeout-secs", default)]
    pub timeout_secs: Option<f64>,
}

fn default_true() -> bool {
    true
}

fn default_max_feed_items() -> usize {
    1000
}

fn default_tz_offset() -> i32 {
    3
}

fn default_max_runtime() -> u64 {
    1200
}

fn default_min_delay() -> u64 {
    2000
}

fn default_jitter() -> u64 {
    500
}

fn default_seen_window() -> usize {
    500
}

fn default_cooldown_hours() -> i64 {
    6
}

fn default_max_links() -> usize {
    60
}

fn default_min_content_len() -> usize {
    80
}

fn default_link_min_text_len() -> usize {
    20
}

fn default_source_max_items() -> usize {
    60
}

fn default_max_pages() -> u32 {
    1
}

fn default_warmup_delay_min() -> f64 {
    5.0
}

fn default_warmup_delay_max() -> f64 {
    10.0
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_factor() -> f64 {
    1.5
}
