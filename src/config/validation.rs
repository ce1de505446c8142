use crate::config::types::{Config, HarvestConfig, SourceConfig, StrategyConfig};
use crate::{ConfigError, ConfigResult};
use regex::Regex;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_harvest_config(&config.harvest)?;
    validate_paths(config)?;

    if config.sources.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[source]] must be configured".to_string(),
        ));
    }

    let mut slugs = HashSet::new();
    for source in &config.sources {
        validate_source(source)?;
        if !slugs.insert(source.slug.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate source slug '{}'",
                source.slug
            )));
        }
    }

    for pattern in &config.filters.listing_patterns {
        validate_pattern(pattern)?;
    }

    Ok(())
}

/// Validates global harvest limits
fn validate_harvest_config(config: &HarvestConfig) -> ConfigResult<()> {
    if config.max_runtime_secs == 0 {
        return Err(ConfigError::Validation(
            "max-runtime-secs must be >= 1".to_string(),
        ));
    }

    if config.seen_window == 0 {
        return Err(ConfigError::Validation(
            "seen-window must be >= 1".to_string(),
        ));
    }

    if config.max_links_per_source == 0 {
        return Err(ConfigError::Validation(
            "max-links-per-source must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates artifact paths
fn validate_paths(config: &Config) -> ConfigResult<()> {
    if config.paths.feed_path.is_empty() {
        return Err(ConfigError::Validation(
            "feed-path cannot be empty".to_string(),
        ));
    }

    if config.paths.state_path.is_empty() {
        return Err(ConfigError::Validation(
            "state-path cannot be empty".to_string(),
        ));
    }

    if config.paths.page_cache_dir.is_empty() {
        return Err(ConfigError::Validation(
            "page-cache-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates a single source entry
fn validate_source(source: &SourceConfig) -> ConfigResult<()> {
    if source.slug.is_empty() {
        return Err(ConfigError::Validation(format!(
            "source '{}' has an empty slug",
            source.name
        )));
    }

    if !source
        .slug
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "source slug '{}' must contain only alphanumerics, hyphens and underscores",
            source.slug
        )));
    }

    let url = Url::parse(&source.url)
        .map_err(|e| ConfigError::InvalidUrl(format!("source '{}': {}", source.slug, e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "source '{}' must use an http(s) URL, got '{}'",
            source.slug, source.url
        )));
    }

    for pattern in source
        .include_patterns
        .iter()
        .chain(&source.exclude_patterns)
        .chain(&source.allow_patterns)
        .chain(&source.listing_patterns)
    {
        validate_pattern(pattern)?;
    }

    if source.max_pages == 0 {
        return Err(ConfigError::Validation(format!(
            "source '{}': max-pages must be >= 1",
            source.slug
        )));
    }

    if let Some(strategy) = &source.strategy {
        validate_strategy(&source.slug, strategy)?;
    }

    Ok(())
}

/// Validates a strategy override
fn validate_strategy(slug: &str, strategy: &StrategyConfig) -> ConfigResult<()> {
    if strategy.max_attempts == 0 {
        return Err(ConfigError::Validation(format!(
            "source '{}': max-attempts must be >= 1",
            slug
        )));
    }

    if strategy.backoff_factor < 0.0 {
        return Err(ConfigError::Validation(format!(
            "source '{}': backoff-factor must not be negative",
            slug
        )));
    }

    for proxy in &strategy.proxies {
        Url::parse(proxy).map_err(|e| {
            ConfigError::InvalidUrl(format!("source '{}': invalid proxy '{}': {}", slug, proxy, e))
        })?;
    }

    if let Some(warmup) = &strategy.warmup {
        if warmup.delay_min_secs > warmup.delay_max_secs {
            return Err(ConfigError::Validation(format!(
                "source '{}': warm-up delay range is inverted ({} > {})",
                slug, warmup.delay_min_secs, warmup.delay_max_secs
            )));
        }
        if let Some(url) = &warmup.url {
            Url::parse(url).map_err(|e| {
                ConfigError::InvalidUrl(format!("source '{}': invalid warm-up URL: {}", slug, e))
            })?;
        }
    }

    Ok(())
}

fn validate_pattern(pattern: &str) -> ConfigResult<()> {
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", pattern, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{FeedConfig, FilterConfig, PathsConfig, SourceMode};

    fn base_source(slug: &str) -> SourceConfig {
        SourceConfig {
            name: slug.to_string(),
            slug: slug.to_string(),
            url: format!("https://{}.example.com/news/", slug),
            mode: SourceMode::Listing,
            enabled: true,
            include_patterns: vec![],
            exclude_patterns: vec![],
            allow_patterns: vec![],
            listing_patterns: vec![],
            restrict_domain: false,
            link_min_text_len: 20,
            allow_empty_anchor: false,
            follow_detail: true,
            content_selectors: vec![],
            max_items: 60,
            page_param: None,
            max_pages: 1,
            strategy: None,
        }
    }

    fn base_config() -> Config {
        Config {
            feed: FeedConfig {
                title: "Test feed".to_string(),
                home_page_url: "https://example.com/".to_string(),
                feed_url: "https://example.com/unified.json".to_string(),
                max_items: 1000,
                timezone_offset_hours: 3,
            },
            paths: PathsConfig {
                feed_path: "docs/unified.json".to_string(),
                state_path: ".cache/state.json".to_string(),
                page_cache_dir: ".cache/pages".to_string(),
            },
            harvest: HarvestConfig::default(),
            filters: FilterConfig::default(),
            sources: vec![base_source("alpha")],
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn test_empty_sources_rejected() {
        let mut config = base_config();
        config.sources.clear();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_duplicate_slugs_rejected() {
        let mut config = base_config();
        config.sources.push(base_source("alpha"));
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_invalid_source_url_rejected() {
        let mut config = base_config();
        config.sources[0].url = "ftp://example.com/".to_string();
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut config = base_config();
        config.sources[0].include_patterns = vec!["([".to_string()];
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = base_config();
        let strategy = StrategyConfig {
            max_attempts: 0,
            ..Default::default()
        };
        config.sources[0].strategy = Some(strategy);
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_inverted_warmup_range_rejected() {
        let mut config = base_config();
        let strategy = StrategyConfig {
            max_attempts: 3,
            backoff_factor: 1.5,
            warmup: Some(crate::config::WarmupSection {
                url: None,
                delay_min_secs: 5.0,
                delay_max_secs: 1.0,
                timeout_secs: None,
            }),
            ..Default::default()
        };
        config.sources[0].strategy = Some(strategy);
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }
}
