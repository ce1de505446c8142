//! Adaptive per-host fetch engine
//!
//! Hostile hosts are handled with a layered protocol: per-host strategies
//! describe timeouts, retry statuses, proxies and warm-up recipes; a
//! `HostClient` executes the warm-up/retry/backoff state machine and keeps
//! the host's cookies and failure counters alive across runs through the
//! crawl state.

pub mod client;
pub mod cookies;
pub mod solver;
pub mod strategy;

pub use client::{FetchedPage, HostClient};
pub use cookies::{has_protection_cookies, CookieRecord};
pub use solver::{ChallengeSolver, NoSolver};
pub use strategy::{RequestStrategy, StrategyRegistry, WarmupRecipe};
