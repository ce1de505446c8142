//! Unifeed: an incremental news-feed harvester
//!
//! This crate harvests news articles from heterogeneous, often bot-protected
//! websites and merges them into a single deduplicated JSON feed, carrying
//! per-host fetch strategies, conditional-GET state and a sliding seen-URL
//! window across runs.

pub mod cache;
pub mod config;
pub mod feed;
pub mod fetch;
pub mod harvest;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for unifeed operations
#[derive(Debug, Error)]
pub enum UnifeedError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Host {host} unavailable: {detail}")]
    HostUnavailable { host: String, detail: String },

    #[error("Challenge escalation unavailable for {host}: {detail}")]
    EscalationUnavailable { host: String, detail: String },

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Merged feed shrank below baseline: {total} < {allowed_min}")]
    ShrinkingFeed { total: usize, allowed_min: usize },

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for unifeed operations
pub type Result<T> = std::result::Result<T, UnifeedError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use feed::{item_id, Feed, FeedItem};
pub use state::{CrawlState, HostState, SourceState};
pub use url::{canonical_url, extract_host};
