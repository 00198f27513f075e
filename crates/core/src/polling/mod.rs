//! Adaptive polling of cache keys.
//!
//! ```text
//!          start                 timer / request_refresh
//! Idle ───────────> Scheduled ──────────────────────────> Fetching
//!                     ^   ^                                   │
//!                     │   └─────────── completion ────────────┘
//!          resume     │
//!                     │          background / refresh disabled
//!                 Suspended <──────────────────────────────── (any)
//! ```
//!
//! Host signals arrive as a [`RuntimeProfile`] via
//! [`PollingScheduler::set_profile`]. Losing permission to refresh while
//! `Fetching` cancels the fetch between retry attempts.

mod inflight;
mod interval;
mod profile;
mod scheduler;

pub use inflight::{InFlightGuard, InFlightRegistry};
pub use interval::{AdaptiveInterval, IntervalProvider};
pub use profile::{PowerMode, RuntimeProfile, Visibility};
pub use scheduler::PollingScheduler;

use async_trait::async_trait;
use scrapmarket_market_data::{CancelSignal, ClassifiedError};
use serde::Serialize;

use crate::cache::CacheKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Idle,
    Scheduled,
    Fetching,
    Suspended,
}

/// Result of one refresh of one key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    Committed,
    /// Fetched, but a newer value was already committed.
    Discarded,
    /// Another fetch for the key was running; nothing was done.
    AlreadyInFlight,
    /// The previous cache value, if any, is untouched.
    Failed(ClassifiedError),
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Committed | Self::Discarded)
    }
}

/// Fetches and commits fresh data for a key.
#[async_trait]
pub trait Refresher: Send + Sync {
    async fn refresh(&self, key: &CacheKey, cancel: CancelSignal) -> RefreshOutcome;
}
