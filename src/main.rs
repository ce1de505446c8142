//! Unifeed main entry point
//!
//! This is the command-line interface for the unifeed news harvester.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use unifeed::cache::PageCache;
use unifeed::config::load_config_with_hash;
use unifeed::feed::{check_shrinkage, merge_items, Feed, FeedBaseline};
use unifeed::fetch::{NoSolver, StrategyRegistry};
use unifeed::harvest::{run_harvest, HarvestContext};
use unifeed::url::UrlFilters;
use unifeed::CrawlState;
use tracing_subscriber::EnvFilter;

/// Unifeed: an incremental news-feed harvester
///
/// Unifeed crawls configured news listings, fetches new articles through
/// per-host adaptive strategies, and merges the results into a single
/// JSON Feed artifact without ever losing previously published history.
#[derive(Parser, Debug)]
#[command(name = "unifeed")]
#[command(version = "1.0.0")]
#[command(about = "An incremental news-feed harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Ignore change detection and the seen-URL filter, re-harvest everything
    #[arg(long)]
    force: bool,

    /// Compute the harvest but persist neither feed nor state
    #[arg(long)]
    dry_run: bool,

    /// Harvest only these source slugs (comma separated)
    #[arg(long, value_delimiter = ',')]
    only: Vec<String>,

    /// Override the global runtime budget in seconds
    #[arg(long, value_name = "SECS")]
    max_runtime: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match run(config, config_hash, &cli).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("unifeed=info,warn"),
            1 => EnvFilter::new("unifeed=debug,info"),
            2 => EnvFilter::new("unifeed=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Prints the resolved source and strategy table for --dry-run
fn print_plan(config: &unifeed::Config, registry: &StrategyRegistry) {
    println!("=== Unifeed Dry Run ===\n");

    println!("Feed:");
    println!("  Title: {}", config.feed.title);
    println!("  Artifact: {}", config.paths.feed_path);
    println!("  Max items: {}", config.feed.max_items);

    println!("\nSources ({}):", config.sources.len());
    for source in &config.sources {
        let marker = if source.enabled { "-" } else { "x" };
        println!("  {} {} ({})", marker, source.slug, source.url);
        let host = unifeed::extract_host(&source.url).unwrap_or_default();
        let strategy = registry.strategy_for(&host);
        println!(
            "    attempts: {}, backoff: {}, proxies: {}, warm-up: {}, escalate: {}",
            strategy.max_attempts,
            strategy.backoff_factor,
            strategy.proxies.len(),
            if strategy.warmup.is_some() { "yes" } else { "no" },
            if strategy.escalate { "yes" } else { "no" },
        );
    }
    println!();
}

/// Runs one harvest cycle end-to-end
async fn run(config: unifeed::Config, config_hash: String, cli: &Cli) -> unifeed::Result<()> {
    let tz = chrono::FixedOffset::east_opt(config.feed.timezone_offset_hours * 3600)
        .ok_or_else(|| {
            unifeed::UnifeedError::Config(unifeed::ConfigError::Validation(
                "timezone-offset-hours out of range".to_string(),
            ))
        })?;

    let state_path = Path::new(&config.paths.state_path).to_path_buf();
    let feed_path = Path::new(&config.paths.feed_path).to_path_buf();

    let state = CrawlState::load(&state_path);
    let existing_feed = Feed::load(&feed_path, &config.feed)?;
    tracing::info!(
        "Loaded {} existing items, {} known hosts",
        existing_feed.items.len(),
        state.hosts.len()
    );

    let global_filters = UrlFilters::from_config(&config)?;
    let baseline = FeedBaseline::of(&existing_feed, &global_filters);
    tracing::info!(
        "Baseline: {} items, {} without content, {} listing urls",
        baseline.total,
        baseline.empty_content_text,
        baseline.listing_url_count
    );

    let registry = StrategyRegistry::from_config(&config);
    if cli.dry_run {
        print_plan(&config, &registry);
    }
    let cache = Arc::new(PageCache::open(Path::new(&config.paths.page_cache_dir))?);
    let state = Arc::new(Mutex::new(state));

    let max_runtime = cli.max_runtime.unwrap_or(config.harvest.max_runtime_secs);
    let ctx = HarvestContext {
        harvest: config.harvest.clone(),
        filters: config.filters.clone(),
        tz,
        force: cli.force,
        deadline: Instant::now() + Duration::from_secs(max_runtime),
    };

    let only = (!cli.only.is_empty()).then_some(cli.only.as_slice());
    {
        let mut state = state.lock().expect("crawl state lock poisoned");
        state.stats.errors.clear();
        state.stats.skips.clear();
    }

    tracing::info!("==== Harvest start ====");
    let new_items = run_harvest(
        &config,
        &registry,
        state.clone(),
        cache,
        Arc::new(NoSolver),
        ctx,
        only,
    )
    .await;
    tracing::info!("Harvested {} new items", new_items.len());

    let first_seen = {
        let state = state.lock().expect("crawl state lock poisoned");
        state.first_seen.clone()
    };
    let merged = merge_items(
        &existing_feed.items,
        &new_items,
        &first_seen,
        &global_filters,
        config.feed.max_items,
    );

    // a shrinking feed means extraction regressed; abort before persisting
    check_shrinkage(&baseline, merged.len())?;

    let mut feed = existing_feed;
    let merged_len = merged.len();
    feed.items = merged;

    {
        let mut state = state.lock().expect("crawl state lock poisoned");
        state.stats.last_run = Some(chrono::Utc::now());
        state.stats.item_count = merged_len;
        state.stats.config_hash = Some(config_hash);
    }

    if cli.dry_run {
        tracing::info!(
            "Dry run: feed would contain {} items ({} new), nothing persisted",
            merged_len,
            new_items.len()
        );
        return Ok(());
    }

    if new_items.is_empty() && feed_path.exists() {
        // no-op harvest leaves the published artifact untouched
        tracing::info!("No new items, feed artifact left as-is");
    } else {
        feed.save(&feed_path)?;
        tracing::info!("Saved feed to {} ({} items)", feed_path.display(), merged_len);
    }

    let state = state.lock().expect("crawl state lock poisoned");
    state.save(&state_path)?;
    tracing::info!("Saved crawl state to {}", state_path.display());

    Ok(())
}
