//! Challenge-solver escalation seam
//!
//! Rendering a page in a real browser engine is the expensive last resort
//! for hosts whose challenge cannot be passed with plain HTTP. The solver
//! is injected so the fetch protocol stays testable without spawning a
//! browser; the failing `NoSolver` is the default and a valid substitute.

use crate::fetch::cookies::CookieRecord;
use crate::{Result, UnifeedError};

/// Acquires session cookies by solving a bot challenge out of band
pub trait ChallengeSolver: Send + Sync {
    /// Solves the challenge at `url` and returns the resulting cookie set
    ///
    /// # Errors
    ///
    /// `EscalationUnavailable` when no solver capability exists or solving
    /// failed; the caller treats the host as currently unreachable.
    fn solve(&self, host: &str, url: &str) -> Result<Vec<CookieRecord>>;
}

/// Default solver: escalation is not available in this build
pub struct NoSolver;

impl ChallengeSolver for NoSolver {
    fn solve(&self, host: &str, _url: &str) -> Result<Vec<CookieRecord>> {
        Err(UnifeedError::EscalationUnavailable {
            host: host.to_string(),
            detail: "no challenge solver configured".to_string(),
        })
    }
}
