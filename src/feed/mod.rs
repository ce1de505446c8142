//! Feed data model and the persisted JSON Feed artifact

pub mod merge;
pub mod metrics;

pub use merge::merge_items;
pub use metrics::{check_shrinkage, FeedBaseline};

use crate::config::FeedConfig;
use crate::{Result, UnifeedError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// JSON Feed version the artifact declares
pub const JSON_FEED_VERSION: &str = "https://jsonfeed.org/version/1.1";

/// Canonical unit of output
///
/// `id` is a pure function of `url`; nothing else about the item affects
/// its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: String,
    pub url: String,
    pub title: String,
    /// ISO-8601 in the feed's civil timezone, null when truly unknown
    pub date_published: Option<String>,
    pub content_text: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub source: String,
}

impl FeedItem {
    pub fn new(url: &str, title: &str, source: &str) -> Self {
        FeedItem {
            id: item_id(url),
            url: url.to_string(),
            title: title.to_string(),
            date_published: None,
            content_text: None,
            tags: Vec::new(),
            source: source.to_string(),
        }
    }
}

/// Stable item identity: SHA-256 of the canonical URL
pub fn item_id(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// The externally visible artifact, a JSON Feed 1.1 document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub version: String,
    pub title: String,
    pub home_page_url: String,
    pub feed_url: String,
    pub items: Vec<FeedItem>,
}

impl Feed {
    pub fn empty(config: &FeedConfig) -> Self {
        Feed {
            version: JSON_FEED_VERSION.to_string(),
            title: config.title.clone(),
            home_page_url: config.home_page_url.clone(),
            feed_url: config.feed_url.clone(),
            items: Vec::new(),
        }
    }

    /// Loads the persisted feed; a missing file yields an empty feed
    ///
    /// An unreadable existing artifact is an error rather than an empty
    /// baseline, since treating it as empty would let a later merge discard
    /// the published history.
    pub fn load(path: &Path, config: &FeedConfig) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Feed::empty(config));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw).map_err(|e| {
            UnifeedError::Feed(format!("corrupt feed artifact {}: {}", path.display(), e))
        })
    }

    /// Writes the feed atomically
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
}
