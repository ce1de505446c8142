//! Field-level feed reconciliation
//!
//! Merging freshly harvested items into the persisted feed must never lose
//! history: richer fields survive empty re-extractions, and synthetic
//! first-seen dates are not allowed to masquerade as fresh publications.

use crate::feed::FeedItem;
use crate::url::UrlFilters;
use std::collections::HashMap;

/// Merges new items into the existing feed, per URL key
///
/// Items only one side knows stay as-is. When both sides share a URL the
/// existing record is overlaid with the new one, except:
///
/// * `content_text` is only overwritten by a non-empty value, so a failed
///   extraction cannot erase previously captured text;
/// * a new `date_published` equal to the item id's recorded first-seen
///   fallback is ignored, so a perpetually dateless item does not appear to
///   republish on every run.
///
/// Listing-classified URLs are dropped from both sides, which retroactively
/// cleans the feed as classifier rules improve. The result is sorted by
/// date descending with dateless items last and capped to `max_items`.
pub fn merge_items(
    existing: &[FeedItem],
    new: &[FeedItem],
    first_seen: &HashMap<String, String>,
    filters: &UrlFilters,
    max_items: usize,
) -> Vec<FeedItem> {
    let mut merged: Vec<FeedItem> = Vec::with_capacity(existing.len() + new.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for item in existing {
        if filters.is_listing_url(&item.url) {
            continue;
        }
        index.insert(item.url.clone(), merged.len());
        merged.push(item.clone());
    }

    for item in new {
        if filters.is_listing_url(&item.url) {
            continue;
        }
        match index.get(&item.url) {
            Some(&pos) => {
                let combined = overlay(&merged[pos], item, first_seen);
                merged[pos] = combined;
            }
            None => {
                index.insert(item.url.clone(), merged.len());
                merged.push(item.clone());
            }
        }
    }

    merged.sort_by(|a, b| sort_key(b).cmp(&sort_key(a)));
    merged.truncate(max_items);
    merged
}

fn overlay(existing: &FeedItem, new: &FeedItem, first_seen: &HashMap<String, String>) -> FeedItem {
    let mut result = existing.clone();
    result.id = new.id.clone();
    result.title = new.title.clone();
    result.tags = new.tags.clone();
    result.source = new.source.clone();

    if let Some(text) = &new.content_text {
        if !text.is_empty() {
            result.content_text = Some(text.clone());
        }
    }

    if let Some(new_date) = &new.date_published {
        let fallback = first_seen.get(&new.id);
        if fallback != Some(new_date) {
            result.date_published = Some(new_date.clone());
        }
    }

    result
}

/// Dated items before dateless, then ISO string order
fn sort_key(item: &FeedItem) -> (bool, &str) {
    (
        item.date_published.is_some(),
        item.date_published.as_deref().unwrap_or(""),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::item_id;

    fn item(url: &str, title: &str, date: Option<&str>, content: Option<&str>) -> FeedItem {
        FeedItem {
            id: item_id(url),
            url: url.to_string(),
            title: title.to_string(),
            date_published: date.map(|s| s.to_string()),
            content_text: content.map(|s| s.to_string()),
            tags: Vec::new(),
            source: "test".to_string(),
        }
    }

    fn no_filters() -> UrlFilters {
        UrlFilters::empty()
    }

    #[test]
    fn test_merge_with_nothing_new_is_identity() {
        let existing = vec![
            item("https://example.com/a", "A", Some("2026-02-02T10:00:00+03:00"), None),
            item("https://example.com/b", "B", Some("2026-01-01T10:00:00+03:00"), None),
            item("https://example.com/c", "C", None, None),
        ];
        let merged = merge_items(&existing, &[], &HashMap::new(), &no_filters(), 1000);
        assert_eq!(merged, existing);
    }

    #[test]
    fn test_allow_pattern_keeps_section_shaped_article_in_feed() {
        // a two-segment /news/<slug> URL that the generic heuristics call a
        // section hub; the allow pattern must keep it mergeable
        let url = "https://special.example.com/news/big-story";
        let filters = UrlFilters::from_patterns(
            &[r"^https://special\.example\.com/news/[a-z0-9-]+/?$".to_string()],
            &[],
        )
        .unwrap();
        assert!(!filters.is_listing_url(url));

        let new = vec![item(url, "Big story", None, Some("body text"))];
        let merged = merge_items(&[], &new, &HashMap::new(), &filters, 100);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].url, url);

        // heuristics-only filters would have dropped it
        let dropped = merge_items(&[], &new, &HashMap::new(), &no_filters(), 100);
        assert!(dropped.is_empty());
    }

    #[test]
    fn test_one_sided_urls_are_kept() {
        let existing = vec![item("https://example.com/a", "A", None, None)];
        let new = vec![item("https://example.com/b", "B", None, None)];
        let merged = merge_items(&existing, &new, &HashMap::new(), &no_filters(), 1000);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_rich_field_guard_keeps_existing_content() {
        let existing = vec![item(
            "https://example.com/a",
            "Old title",
            None,
            Some("Existing full text"),
        )];
        let new = vec![item(
            "https://example.com/a",
            "Updated title",
            Some("2026-02-02T10:00:00+03:00"),
            None,
        )];

        let merged = merge_items(&existing, &new, &HashMap::new(), &no_filters(), 1000);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "Updated title");
        assert_eq!(
            merged[0].date_published.as_deref(),
            Some("2026-02-02T10:00:00+03:00")
        );
        assert_eq!(merged[0].content_text.as_deref(), Some("Existing full text"));
    }

    #[test]
    fn test_empty_string_content_does_not_erase() {
        let existing = vec![item("https://example.com/a", "A", None, Some("text"))];
        let new = vec![item("https://example.com/a", "A", None, Some(""))];
        let merged = merge_items(&existing, &new, &HashMap::new(), &no_filters(), 1000);
        assert_eq!(merged[0].content_text.as_deref(), Some("text"));
    }

    #[test]
    fn test_date_churn_guard() {
        let url = "https://example.com/a";
        let fallback = "2026-02-25T12:00:00+03:00";
        let mut first_seen = HashMap::new();
        first_seen.insert(item_id(url), fallback.to_string());

        let existing = vec![item(url, "First crawl", Some("2026-02-20T09:00:00+03:00"), None)];
        let new = vec![item(url, "Second crawl", Some(fallback), None)];

        // re-merging the fallback any number of times leaves the date alone
        let mut merged = merge_items(&existing, &new, &first_seen, &no_filters(), 1000);
        for _ in 0..3 {
            merged = merge_items(&merged, &new, &first_seen, &no_filters(), 1000);
        }

        assert_eq!(merged.len(), 1);
        assert_eq!(
            merged[0].date_published.as_deref(),
            Some("2026-02-20T09:00:00+03:00")
        );
        assert_eq!(merged[0].title, "Second crawl");
    }

    #[test]
    fn test_real_date_still_overwrites() {
        let url = "https://example.com/a";
        let mut first_seen = HashMap::new();
        first_seen.insert(item_id(url), "2026-02-25T12:00:00+03:00".to_string());

        let existing = vec![item(url, "A", Some("2026-02-20T09:00:00+03:00"), None)];
        let new = vec![item(url, "A", Some("2026-02-24T18:30:00+03:00"), None)];

        let merged = merge_items(&existing, &new, &first_seen, &no_filters(), 1000);
        assert_eq!(
            merged[0].date_published.as_deref(),
            Some("2026-02-24T18:30:00+03:00")
        );
    }

    #[test]
    fn test_listing_urls_dropped_from_both_sides() {
        let existing = vec![
            item("https://example.com/tag/metro/", "Tag page", None, None),
            item("https://example.com/a", "A", None, None),
        ];
        let new = vec![item("https://example.com/news/?page=2", "Page 2", None, None)];

        let merged = merge_items(&existing, &new, &HashMap::new(), &no_filters(), 1000);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].url, "https://example.com/a");
    }

    #[test]
    fn test_sorted_date_desc_dateless_last() {
        let existing = vec![
            item("https://example.com/old", "Old", Some("2026-01-01T00:00:00+03:00"), None),
            item("https://example.com/none", "None", None, None),
            item("https://example.com/new", "New", Some("2026-02-01T00:00:00+03:00"), None),
        ];
        let merged = merge_items(&existing, &[], &HashMap::new(), &no_filters(), 1000);

        let urls: Vec<&str> = merged.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/new",
                "https://example.com/old",
                "https://example.com/none",
            ]
        );
    }

    #[test]
    fn test_capped_to_max_items() {
        let existing: Vec<FeedItem> = (0..20)
            .map(|i| {
                item(
                    &format!("https://example.com/{}", i),
                    "T",
                    Some(&format!("2026-01-{:02}T00:00:00+03:00", i + 1)),
                    None,
                )
            })
            .collect();
        let merged = merge_items(&existing, &[], &HashMap::new(), &no_filters(), 5);
        assert_eq!(merged.len(), 5);
        // the most recent survive the cap
        assert_eq!(
            merged[0].date_published.as_deref(),
            Some("2026-01-20T00:00:00+03:00")
        );
    }
}
