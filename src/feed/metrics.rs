//! Feed monotonicity check
//!
//! Legitimate filtering (dropping listing-classified URLs) is the only
//! sanctioned cause of a shrinking feed. Any larger drop means extraction
//! or filtering regressed, and the run must fail before persisting.

use crate::feed::Feed;
use crate::url::UrlFilters;
use crate::{Result, UnifeedError};

/// Size snapshot of the feed before a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedBaseline {
    pub total: usize,
    pub listing_url_count: usize,
    /// Items carrying no usable body text, a quality signal for the logs
    pub empty_content_text: usize,
}

impl FeedBaseline {
    pub fn of(feed: &Feed, filters: &UrlFilters) -> Self {
        let listing_url_count = feed
            .items
            .iter()
            .filter(|i| filters.is_listing_url(&i.url))
            .count();
        let empty_content_text = feed
            .items
            .iter()
            .filter(|i| i.content_text.as_deref().map_or(true, str::is_empty))
            .count();
        FeedBaseline {
            total: feed.items.len(),
            listing_url_count,
            empty_content_text,
        }
    }

    /// The smallest total a merge result is allowed to have
    pub fn allowed_min(&self) -> usize {
        self.total.saturating_sub(self.listing_url_count)
    }
}

/// Fails when a merge result shrank more than listing cleanup can explain
pub fn check_shrinkage(baseline: &FeedBaseline, merged_total: usize) -> Result<()> {
    let allowed_min = baseline.allowed_min();
    if merged_total < allowed_min {
        return Err(UnifeedError::ShrinkingFeed {
            total: merged_total,
            allowed_min,
        });
    }
    Ok(())
}
