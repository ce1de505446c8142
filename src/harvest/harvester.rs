//! Per-source harvest pipeline
//!
//! The pipeline: cooldown gate, conditional listing fetch with cached-body
//! fallback, unchanged-index skip, candidate filtering, seen-URL diff, and
//! bounded article fetching. Every failure is contained at the narrowest
//! scope: a bad article is skipped, a dead host cools the source down, and
//! the run always continues.

use crate::cache::PageCache;
use crate::config::{FilterConfig, HarvestConfig, SourceConfig, SourceMode};
use crate::fetch::{FetchedPage, HostClient};
use crate::harvest::extract;
use crate::state::{ConditionalHeaders, CrawlState};
use crate::url::UrlFilters;
use crate::{item_id, FeedItem, Result, UnifeedError};
use chrono::{Duration as ChronoDuration, FixedOffset, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Hosts that serve an accelerated-mobile variant under `<url>/amp`
fn has_amp_variant(filters: &FilterConfig, host: &str) -> bool {
    filters.amp_hosts.iter().any(|h| h == host)
}

/// Run-wide harvesting context shared by every source
#[derive(Clone)]
pub struct HarvestContext {
    pub harvest: HarvestConfig,
    pub filters: FilterConfig,
    pub tz: FixedOffset,
    pub force: bool,
    pub deadline: Instant,
}

/// Harvests one source end-to-end
///
/// Returns the freshly built items; an empty result covers the no-change,
/// cooldown-without-cache and nothing-new cases alike, with the reason
/// logged and recorded in the crawl state where appropriate.
pub async fn harvest_source(
    source: &SourceConfig,
    ctx: &HarvestContext,
    client: &mut HostClient,
    cache: &PageCache,
    state: &Arc<Mutex<CrawlState>>,
) -> Result<Vec<FeedItem>> {
    let listing_url = Url::parse(&source.url)?;

    let mut listing_patterns = source.listing_patterns.clone();
    listing_patterns.extend(ctx.filters.listing_patterns.iter().cloned());
    let filters = UrlFilters::from_patterns(&source.allow_patterns, &listing_patterns)?;

    let include = compile_patterns(&source.include_patterns)?;
    let exclude = compile_patterns(&source.exclude_patterns)?;

    // cooldown gate: a cached listing still gets extracted, otherwise skip
    let cooling = {
        let state = state.lock().expect("crawl state lock poisoned");
        state
            .sources
            .get(&source.slug)
            .map(|s| s.in_cooldown(Utc::now()))
            .unwrap_or(false)
    };

    let body = if cooling && !ctx.force {
        match cache.load(&listing_url) {
            Some(cached) => {
                info!(
                    "Source {} cooling down, using cached listing",
                    source.slug
                );
                cached
            }
            None => {
                info!("Source {} cooling down, skipped", source.slug);
                let mut state = state.lock().expect("crawl state lock poisoned");
                state.record_skip(&source.slug, "cooldown");
                return Ok(Vec::new());
            }
        }
    } else {
        match fetch_listing(&listing_url, client, cache, state).await {
            Ok(body) => {
                let mut state = state.lock().expect("crawl state lock poisoned");
                state.source_mut(&source.slug).cooldown_until = None;
                body
            }
            Err(e) => {
                warn!("Listing fetch failed for {}: {}", source.slug, e);
                let until = Utc::now() + ChronoDuration::hours(ctx.harvest.cooldown_hours);
                {
                    let mut state = state.lock().expect("crawl state lock poisoned");
                    state.source_mut(&source.slug).cooldown_until = Some(until);
                    state.record_error(&source.slug, &source.url, &e.to_string());
                }
                match cache.load(&listing_url) {
                    Some(cached) => {
                        info!("Continuing {} degraded from cached listing", source.slug);
                        cached
                    }
                    None => return Ok(Vec::new()),
                }
            }
        }
    };

    // unchanged-index skip, dominant cost saver for slow-moving listings
    let index_hash = content_hash(&body);
    if !ctx.force {
        let mut state = state.lock().expect("crawl state lock poisoned");
        let unchanged = state
            .sources
            .get(&source.slug)
            .map(|s| s.index_hash.as_deref() == Some(index_hash.as_str()))
            .unwrap_or(false);
        if unchanged {
            debug!("Listing for {} unchanged, skipping", source.slug);
            state.record_skip(&source.slug, "unchanged listing");
            return Ok(Vec::new());
        }
    }

    let mut candidates = collect_candidates(source, &body, &listing_url, client, cache).await;
    candidates.retain(|c| {
        if source.restrict_domain && c.url.host_str() != listing_url.host_str() {
            return false;
        }
        let url_str = c.url.as_str();
        if !include.is_empty() && !include.iter().any(|re| re.is_match(url_str)) {
            return false;
        }
        if exclude.iter().any(|re| re.is_match(url_str)) {
            return false;
        }
        if filters.is_listing_url(url_str) {
            return false;
        }
        if !source.allow_empty_anchor && c.text.chars().count() < source.link_min_text_len {
            return false;
        }
        true
    });
    let cap = source.max_items.min(ctx.harvest.max_links_per_source);
    candidates.truncate(cap);

    let candidate_urls: Vec<String> = candidates.iter().map(|c| c.url.to_string()).collect();

    let new_candidates: Vec<&extract::CandidateLink> = if ctx.force {
        candidates.iter().collect()
    } else {
        let state = state.lock().expect("crawl state lock poisoned");
        let seen = state
            .sources
            .get(&source.slug)
            .map(|s| s.seen_urls.clone())
            .unwrap_or_default();
        candidates
            .iter()
            .filter(|c| !seen.iter().any(|s| s == c.url.as_str()))
            .collect()
    };

    if new_candidates.is_empty() {
        debug!("No new links for {}", source.slug);
        let mut state = state.lock().expect("crawl state lock poisoned");
        state.source_mut(&source.slug).index_hash = Some(index_hash);
        return Ok(Vec::new());
    }

    info!(
        "Source {}: {} candidates, {} new",
        source.slug,
        candidates.len(),
        new_candidates.len()
    );

    let mut items: Vec<FeedItem> = Vec::new();
    let mut processed: Vec<String> = Vec::new();
    let mut completed = true;
    for candidate in new_candidates {
        // the deadline is advisory: finish the current item, start no more
        if Instant::now() >= ctx.deadline {
            warn!("Runtime budget exhausted, stopping {}", source.slug);
            completed = false;
            break;
        }
        match build_item(source, ctx, candidate, client, cache, state).await {
            Some(item) => {
                processed.push(item.url.clone());
                items.push(item);
            }
            None => {
                completed = false;
                let mut state = state.lock().expect("crawl state lock poisoned");
                state.record_error(&source.slug, candidate.url.as_str(), "article fetch failed");
            }
        }
    }

    {
        let mut state = state.lock().expect("crawl state lock poisoned");
        let source_state = state.source_mut(&source.slug);
        source_state.update_seen(&processed, &candidate_urls, ctx.harvest.seen_window);
        // a pass cut short must not look unchanged to the next run, or the
        // unfetched articles stay lost until the listing body changes
        if completed {
            source_state.index_hash = Some(index_hash);
        }
    }

    Ok(items)
}

/// Fetches the listing with conditional headers, resolving 304 to the cache
///
/// A 304 without a cached copy forces one unconditional refetch so the
/// optimization can never make the listing unreadable.
async fn fetch_listing(
    url: &Url,
    client: &mut HostClient,
    cache: &PageCache,
    state: &Arc<Mutex<CrawlState>>,
) -> Result<String> {
    let conditional = {
        let state = state.lock().expect("crawl state lock poisoned");
        state.conditional_for(url.as_str())
    };
    let mut headers: Vec<(String, String)> = Vec::new();
    if let Some(etag) = &conditional.etag {
        headers.push(("If-None-Match".to_string(), etag.clone()));
    }
    if let Some(last_modified) = &conditional.last_modified {
        headers.push(("If-Modified-Since".to_string(), last_modified.clone()));
    }

    let page = client.fetch(url, &headers).await?;
    if page.not_modified {
        if let Some(cached) = cache.load(url) {
            debug!("304 Not Modified: {}", url);
            return Ok(cached);
        }
        // validator said unchanged but the cache is gone
        let page = client.fetch(url, &[]).await?;
        return Ok(finish_listing(url, page, cache, state));
    }
    Ok(finish_listing(url, page, cache, state))
}

fn finish_listing(
    url: &Url,
    page: FetchedPage,
    cache: &PageCache,
    state: &Arc<Mutex<CrawlState>>,
) -> String {
    if let Err(e) = cache.store(url, &page.body) {
        warn!("Failed to cache listing {}: {}", url, e);
    }
    let mut state = state.lock().expect("crawl state lock poisoned");
    state.set_conditional(
        url.as_str(),
        ConditionalHeaders {
            etag: page.etag,
            last_modified: page.last_modified,
        },
    );
    page.body
}

/// Gathers candidates, walking extra pages for paged-API sources
async fn collect_candidates(
    source: &SourceConfig,
    first_body: &str,
    listing_url: &Url,
    client: &mut HostClient,
    cache: &PageCache,
) -> Vec<extract::CandidateLink> {
    let mut candidates = extract::extract_candidates(first_body, listing_url);

    if source.mode == SourceMode::PagedApi {
        let Some(page_param) = &source.page_param else {
            return candidates;
        };
        for page_no in 2..=source.max_pages {
            let mut page_url = listing_url.clone();
            page_url
                .query_pairs_mut()
                .append_pair(page_param, &page_no.to_string());
            match client.fetch(&page_url, &[]).await {
                Ok(page) => {
                    if let Err(e) = cache.store(&page_url, &page.body) {
                        warn!("Failed to cache page {}: {}", page_url, e);
                    }
                    for candidate in extract::extract_candidates(&page.body, listing_url) {
                        if !candidates.iter().any(|c| c.url == candidate.url) {
                            candidates.push(candidate);
                        }
                    }
                }
                Err(e) => {
                    warn!("Page {} of {} failed: {}", page_no, source.slug, e);
                    break;
                }
            }
        }
    }
    candidates
}

/// Builds one feed item, `None` when the article is wholly unfetchable
async fn build_item(
    source: &SourceConfig,
    ctx: &HarvestContext,
    candidate: &extract::CandidateLink,
    client: &mut HostClient,
    cache: &PageCache,
    state: &Arc<Mutex<CrawlState>>,
) -> Option<FeedItem> {
    let url = candidate.url.as_str();
    let mut item = FeedItem::new(url, &fallback_title(candidate), &source.name);

    if source.follow_detail {
        let article_body = match client.fetch(&candidate.url, &[]).await {
            Ok(page) => {
                if let Err(e) = cache.store(&candidate.url, &page.body) {
                    warn!("Failed to cache article {}: {}", url, e);
                }
                Some(page.body)
            }
            Err(e) => {
                // availability failure: fall back to any cached copy
                warn!("Article fetch failed for {}: {}", url, e);
                cache.load(&candidate.url)
            }
        };
        let article_body = article_body?;

        if let Some(title) = extract::extract_title(&article_body) {
            item.title = title;
        }
        item.date_published = extract::extract_date(&article_body)
            .and_then(|raw| extract::normalize_date(&raw, ctx.tz));
        item.content_text =
            extract::extract_content(&article_body, &source.content_selectors, ctx.harvest.min_content_len);
        // a body that only repeats the headline is no body at all
        if item.content_text.as_deref() == Some(item.title.as_str()) {
            item.content_text = None;
        }

        if item.content_text.is_none() {
            if let Some(host) = candidate.url.host_str() {
                if has_amp_variant(&ctx.filters, host) {
                    item.content_text = fetch_amp_content(source, ctx, &candidate.url, client).await;
                }
            }
        }
    }

    if item.date_published.is_none() {
        let now_iso = Utc::now().with_timezone(&ctx.tz).to_rfc3339();
        let mut state = state.lock().expect("crawl state lock poisoned");
        let fallback = state.first_seen_or_insert(&item_id(url), &now_iso);
        item.date_published = Some(fallback);
    }

    Some(item)
}

/// Retries extraction against the accelerated-mobile variant of a page
async fn fetch_amp_content(
    source: &SourceConfig,
    ctx: &HarvestContext,
    url: &Url,
    client: &mut HostClient,
) -> Option<String> {
    let amp_url = Url::parse(&format!("{}/amp", url.as_str().trim_end_matches('/'))).ok()?;
    debug!("Retrying content extraction via {}", amp_url);
    match client.fetch(&amp_url, &[]).await {
        Ok(page) => extract::extract_content(
            &page.body,
            &source.content_selectors,
            ctx.harvest.min_content_len,
        ),
        Err(_) => None,
    }
}

fn fallback_title(candidate: &extract::CandidateLink) -> String {
    if candidate.text.is_empty() {
        candidate.url.to_string()
    } else {
        candidate.text.clone()
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| {
                UnifeedError::Config(crate::ConfigError::InvalidPattern(format!("{}: {}", p, e)))
            })
        })
        .collect()
}

/// SHA-256 hex of a page body, the change-detection key
pub fn content_hash(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}
