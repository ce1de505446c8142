//! HTML extraction helpers
//!
//! Candidate links come from every anchor on a listing page; titles, dates
//! and article text come from common meta tags and configurable selectors.
//! All of this is best-effort: an extraction miss yields `None`, never an
//! error, since a title+URL record is still worth emitting.

use crate::url::canonical_url;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;
use url::Url;

/// One anchor found on a listing page
#[derive(Debug, Clone)]
pub struct CandidateLink {
    pub url: Url,
    pub text: String,
}

/// Extracts candidate article links from a listing body
///
/// Hrefs are canonicalized against the listing URL; the first occurrence of
/// each URL wins so listing order is preserved for deduplication.
pub fn extract_candidates(html: &str, base: &Url) -> Vec<CandidateLink> {
    let document = Html::parse_document(html);
    let anchors = anchor_selector();

    let mut candidates: Vec<CandidateLink> = Vec::new();
    for element in document.select(anchors) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(url) = canonical_url(href, base) else {
            continue;
        };
        if candidates.iter().any(|c| c.url == url) {
            continue;
        }
        let text = collapse_whitespace(&element.text().collect::<String>());
        candidates.push(CandidateLink { url, text });
    }
    candidates
}

/// Article title: first `<h1>`, else `<title>`
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    for selector in ["h1", "title"] {
        let Ok(parsed) = Selector::parse(selector) else {
            continue;
        };
        if let Some(element) = document.select(&parsed).next() {
            let text = collapse_whitespace(&element.text().collect::<String>());
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Raw publish-date string from meta tags, `<time>` or page text
pub fn extract_date(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let meta_selectors = [
        "meta[property=\"article:published_time\"]",
        "meta[name=\"article:published_time\"]",
        "meta[name=\"pubdate\"]",
        "meta[itemprop=\"datePublished\"]",
        "meta[name=\"date\"]",
    ];
    for selector in meta_selectors {
        let Ok(parsed) = Selector::parse(selector) else {
            continue;
        };
        if let Some(element) = document.select(&parsed).next() {
            if let Some(content) = element.value().attr("content") {
                if !content.trim().is_empty() {
                    return Some(content.trim().to_string());
                }
            }
        }
    }

    if let Ok(parsed) = Selector::parse("time[datetime]") {
        if let Some(element) = document.select(&parsed).next() {
            if let Some(datetime) = element.value().attr("datetime") {
                if !datetime.trim().is_empty() {
                    return Some(datetime.trim().to_string());
                }
            }
        }
    }

    // last resort: a dd.mm.yyyy somewhere in the visible text
    let text = collapse_whitespace(&document.root_element().text().collect::<String>());
    numeric_date_pattern()
        .find(&text)
        .map(|m| m.as_str().to_string())
}

/// Normalizes a raw date string into ISO-8601 in the feed timezone
///
/// Accepts RFC 3339, a bare `yyyy-mm-ddThh:mm:ss`, and the numeric
/// `dd.mm.yyyy [hh:mm]` form common on RU sites.
pub fn normalize_date(raw: &str, tz: FixedOffset) -> Option<String> {
    let raw = raw.trim();

    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&tz).to_rfc3339());
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return tz
            .from_local_datetime(&parsed)
            .single()
            .map(|dt| dt.to_rfc3339());
    }
    if let Some(captures) = numeric_date_pattern().captures(raw) {
        let day: u32 = captures[1].parse().ok()?;
        let month: u32 = captures[2].parse().ok()?;
        let year: i32 = captures[3].parse().ok()?;
        let hour: u32 = captures
            .get(4)
            .map(|m| m.as_str().parse().ok())
            .unwrap_or(Some(0))?;
        let minute: u32 = captures
            .get(5)
            .map(|m| m.as_str().parse().ok())
            .unwrap_or(Some(0))?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        let datetime = date.and_hms_opt(hour, minute, 0)?;
        return tz
            .from_local_datetime(&datetime)
            .single()
            .map(|dt| dt.to_rfc3339());
    }
    None
}

/// Default selectors tried after any configured ones
const FALLBACK_CONTENT_SELECTORS: &[&str] = &["article", "div.article", "div.news-detail", "main"];

/// Article body text via configured selectors, then common fallbacks
///
/// Returns `None` when nothing reaches `min_len` characters, which the
/// caller treats as "no usable content" rather than an error.
pub fn extract_content(html: &str, selectors: &[String], min_len: usize) -> Option<String> {
    let document = Html::parse_document(html);

    let configured = selectors.iter().map(|s| s.as_str());
    let fallbacks = FALLBACK_CONTENT_SELECTORS.iter().copied();
    for selector in configured.chain(fallbacks) {
        let Ok(parsed) = Selector::parse(selector) else {
            continue;
        };
        if let Some(element) = document.select(&parsed).next() {
            let text = collapse_whitespace(&element.text().collect::<String>());
            if text.chars().count() >= min_len {
                return Some(text);
            }
        }
    }
    None
}

fn anchor_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("a[href]").expect("static selector"))
}

fn numeric_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d{1,2})\.(\d{1,2})\.(\d{4})(?:\s+(\d{1,2}):(\d{2}))?")
            .expect("static pattern")
    })
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
