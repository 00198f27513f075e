use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Derived freshness of a cache entry at a point in time.
///
/// - `Fresh`: `now < stale_at`
/// - `Stale`: `stale_at <= now < expires_at`; servable, triggers a refresh
/// - `Expired`: `now >= expires_at`; not servable from memory
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    Stale,
    Expired,
}

impl Freshness {
    pub fn is_servable(self) -> bool {
        !matches!(self, Self::Expired)
    }
}

/// Stale and expiry windows for one data kind. `stale_after <= expire_after`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreshnessPolicy {
    stale_after: Duration,
    expire_after: Duration,
}

impl FreshnessPolicy {
    /// Build a policy; a stale window longer than the expiry is clamped to it.
    pub fn new(stale_after: Duration, expire_after: Duration) -> Self {
        Self {
            stale_after: stale_after.min(expire_after),
            expire_after,
        }
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    pub fn expire_after(&self) -> Duration {
        self.expire_after
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// A committed cache value with its freshness timestamps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
    pub stale_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Fetch-start sequence number that produced this value.
    pub seq: u64,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, fetched_at: DateTime<Utc>, policy: FreshnessPolicy, seq: u64) -> Self {
        let stale_at = fetched_at
            .checked_add_signed(to_delta(policy.stale_after))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let expires_at = fetched_at
            .checked_add_signed(to_delta(policy.expire_after))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            value,
            fetched_at,
            stale_at,
            expires_at,
            seq,
        }
    }

    pub fn freshness_at(&self, now: DateTime<Utc>) -> Freshness {
        if now >= self.expires_at {
            Freshness::Expired
        } else if now >= self.stale_at {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_freshness_transitions_at_exact_boundaries() {
        let policy = FreshnessPolicy::new(Duration::from_secs(300), Duration::from_secs(3600));
        let entry = CacheEntry::new("v", t0(), policy, 1);

        assert_eq!(entry.freshness_at(t0()), Freshness::Fresh);
        assert_eq!(
            entry.freshness_at(t0() + TimeDelta::seconds(299)),
            Freshness::Fresh
        );
        assert_eq!(
            entry.freshness_at(t0() + TimeDelta::seconds(300)),
            Freshness::Stale
        );
        assert_eq!(
            entry.freshness_at(t0() + TimeDelta::seconds(3599)),
            Freshness::Stale
        );
        assert_eq!(
            entry.freshness_at(t0() + TimeDelta::seconds(3600)),
            Freshness::Expired
        );
    }

    #[test]
    fn test_stale_window_is_clamped_to_expiry() {
        let policy = FreshnessPolicy::new(Duration::from_secs(600), Duration::from_secs(60));
        assert_eq!(policy.stale_after(), Duration::from_secs(60));
    }

    #[test]
    fn test_huge_windows_saturate() {
        let policy = FreshnessPolicy::new(Duration::MAX, Duration::MAX);
        let entry = CacheEntry::new((), t0(), policy, 1);
        assert_eq!(entry.freshness_at(t0()), Freshness::Fresh);
    }
}
