//! Configuration loading and validation
//!
//! Sources, per-host fetch strategies and global harvest limits are all
//! described in a single TOML file that is loaded once per run and treated
//! as read-only afterwards.

mod parser;
mod types;
mod validation;

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use types::{
    Config, FeedConfig, FilterConfig, HarvestConfig, PathsConfig, SourceConfig, SourceMode,
    StrategyConfig, WarmupSection,
};
pub use validation::validate;
