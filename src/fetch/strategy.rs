//! Per-host request strategies
//!
//! Each source may carry a strategy override in its configuration; the
//! registry maps host names to compiled strategies and hands out a default
//! for everything else. Built once per run, read-only afterwards.

use crate::config::{Config, StrategyConfig, WarmupSection};
use crate::url::extract_host;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Browser-like defaults sent with every request
pub const DEFAULT_HEADERS: &[(&str, &str)] = &[
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    ),
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
    ),
    ("Accept-Language", "ru,en;q=0.8"),
];

/// Warm-up recipe executed once per host before regular traffic
#[derive(Debug, Clone)]
pub struct WarmupRecipe {
    /// Explicit warm-up URL; the first real URL is used when absent
    pub url: Option<String>,
    pub delay_min_secs: f64,
    pub delay_max_secs: f64,
    pub timeout: Option<Duration>,
}

impl WarmupRecipe {
    fn from_config(cfg: &WarmupSection) -> Self {
        WarmupRecipe {
            url: cfg.url.clone(),
            delay_min_secs: cfg.delay_min_secs,
            delay_max_secs: cfg.delay_max_secs,
            timeout: cfg.timeout_secs.map(Duration::from_secs_f64),
        }
    }
}

/// Compiled per-host fetch strategy
#[derive(Debug, Clone)]
pub struct RequestStrategy {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_attempts: u32,
    pub backoff_factor: f64,
    pub proxies: Vec<String>,
    pub retry_statuses: Vec<u16>,
    pub extra_headers: BTreeMap<String, String>,
    pub warmup: Option<WarmupRecipe>,
    /// Escalate to an injected challenge solver when the warm-up fails
    pub escalate: bool,
    pub capture_cookies: bool,
    pub record_path_on_success: bool,
}

impl Default for RequestStrategy {
    fn default() -> Self {
        RequestStrategy {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            max_attempts: 3,
            backoff_factor: 1.5,
            proxies: Vec::new(),
            retry_statuses: Vec::new(),
            extra_headers: BTreeMap::new(),
            warmup: None,
            escalate: false,
            capture_cookies: true,
            record_path_on_success: false,
        }
    }
}

impl RequestStrategy {
    pub fn from_config(cfg: &StrategyConfig) -> Self {
        let defaults = RequestStrategy::default();
        RequestStrategy {
            connect_timeout: cfg
                .connect_timeout_secs
                .map(Duration::from_secs_f64)
                .unwrap_or(defaults.connect_timeout),
            read_timeout: cfg
                .read_timeout_secs
                .map(Duration::from_secs_f64)
                .unwrap_or(defaults.read_timeout),
            max_attempts: cfg.max_attempts,
            backoff_factor: cfg.backoff_factor,
            proxies: cfg.proxies.clone(),
            retry_statuses: cfg.retry_statuses.clone(),
            extra_headers: cfg.extra_headers.clone(),
            warmup: cfg.warmup.as_ref().map(WarmupRecipe::from_config),
            escalate: cfg.escalate,
            capture_cookies: cfg.capture_cookies,
            record_path_on_success: cfg.record_path_on_success,
        }
    }

    /// Exponential backoff delay for a 1-based attempt number
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if self.backoff_factor <= 0.0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(16);
        Duration::from_secs_f64(self.backoff_factor * f64::from(1u32 << exponent))
    }
}

/// Host name to strategy mapping, built from the source list
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<RequestStrategy>>,
    default: Arc<RequestStrategy>,
}

impl StrategyRegistry {
    /// Builds the registry from the loaded configuration
    ///
    /// When several sources share a host, the first strategy wins; later
    /// entries for the same host are ignored so ordering in the config file
    /// stays meaningful.
    pub fn from_config(config: &Config) -> Self {
        let mut strategies: HashMap<String, Arc<RequestStrategy>> = HashMap::new();
        for source in &config.sources {
            let Some(strategy_cfg) = &source.strategy else {
                continue;
            };
            let Some(host) = extract_host(&source.url) else {
                continue;
            };
            strategies
                .entry(host)
                .or_insert_with(|| Arc::new(RequestStrategy::from_config(strategy_cfg)));
        }
        StrategyRegistry {
            strategies,
            default: Arc::new(RequestStrategy::default()),
        }
    }

    pub fn strategy_for(&self, host: &str) -> Arc<RequestStrategy> {
        self.strategies
            .get(host)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}
