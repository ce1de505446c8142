//! Host-parallel harvest scheduling
//!
//! Requests to one host must stay strictly serialized because cookies,
//! warm-up state and politeness delays are host-scoped. Sources are grouped
//! by host and each group runs on its own task with a single `HostClient`;
//! groups proceed concurrently under the shared run deadline.

use crate::cache::PageCache;
use crate::config::{Config, SourceConfig};
use crate::fetch::{ChallengeSolver, HostClient, StrategyRegistry};
use crate::harvest::harvester::{harvest_source, HarvestContext};
use crate::state::CrawlState;
use crate::url::extract_host;
use crate::FeedItem;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info};

/// Harvests every selected source, one worker per host
///
/// Single-source failures are recorded in the crawl state and never abort
/// the run; the returned items are everything that was harvested before the
/// deadline.
pub async fn run_harvest(
    config: &Config,
    registry: &StrategyRegistry,
    state: Arc<Mutex<CrawlState>>,
    cache: Arc<PageCache>,
    solver: Arc<dyn ChallengeSolver>,
    ctx: HarvestContext,
    only: Option<&[String]>,
) -> Vec<FeedItem> {
    let mut by_host: Vec<(String, Vec<SourceConfig>)> = Vec::new();
    let mut host_index: HashMap<String, usize> = HashMap::new();

    for source in &config.sources {
        if !source.enabled {
            continue;
        }
        if let Some(only) = only {
            if !only.iter().any(|slug| slug == &source.slug) {
                continue;
            }
        }
        let Some(host) = extract_host(&source.url) else {
            error!("Source {} has no resolvable host, skipped", source.slug);
            continue;
        };
        match host_index.get(&host) {
            Some(&idx) => by_host[idx].1.push(source.clone()),
            None => {
                host_index.insert(host.clone(), by_host.len());
                by_host.push((host, vec![source.clone()]));
            }
        }
    }

    let min_delay = Duration::from_millis(ctx.harvest.min_request_delay_ms);
    let jitter = Duration::from_millis(ctx.harvest.jitter_ms);

    let mut workers = Vec::with_capacity(by_host.len());
    for (host, sources) in by_host {
        let strategy = registry.strategy_for(&host);
        let state = state.clone();
        let cache = cache.clone();
        let solver = solver.clone();
        let ctx = ctx.clone();

        workers.push(tokio::spawn(async move {
            let host_state = {
                let mut state = state.lock().expect("crawl state lock poisoned");
                state.host_mut(&host).clone()
            };
            let mut client =
                match HostClient::new(&host, strategy, host_state, solver, min_delay, jitter) {
                    Ok(client) => client,
                    Err(e) => {
                        error!("Failed to build client for {}: {}", host, e);
                        return Vec::new();
                    }
                };

            let mut items: Vec<FeedItem> = Vec::new();
            for source in &sources {
                info!("Harvest: {} ({})", source.name, source.url);
                match harvest_source(source, &ctx, &mut client, &cache, &state).await {
                    Ok(harvested) => {
                        info!("  -> {} items ({})", harvested.len(), source.name);
                        items.extend(harvested);
                    }
                    Err(e) => {
                        error!("  !! Failed: {} ({})", source.name, e);
                        let mut state = state.lock().expect("crawl state lock poisoned");
                        state.record_error(&source.slug, &source.url, &e.to_string());
                    }
                }
            }

            let host_name = client.host().to_string();
            let final_state = client.into_state();
            let mut state = state.lock().expect("crawl state lock poisoned");
            *state.host_mut(&host_name) = final_state;

            items
        }));
    }

    let mut all_items: Vec<FeedItem> = Vec::new();
    for worker in futures::future::join_all(workers).await {
        match worker {
            Ok(items) => all_items.extend(items),
            Err(e) => error!("Host worker panicked: {}", e),
        }
    }
    all_items
}
