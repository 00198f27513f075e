use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::{CacheRead, Freshness, ReadOrigin};

/// What a consumer gets back from a cache read.
///
/// Reads never fail: a value is either fresh, explicitly marked stale, or
/// unavailable.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PriceView<T> {
    Fresh {
        value: T,
        fetched_at: DateTime<Utc>,
    },
    /// Past its stale time, or restored from the backup store.
    Stale {
        value: T,
        fetched_at: DateTime<Utc>,
        origin: ReadOrigin,
    },
    Unavailable,
}

impl<T> PriceView<T> {
    pub(crate) fn from_read<S>(read: CacheRead<S>, value: T) -> Self {
        match read.freshness {
            Freshness::Fresh if read.origin == ReadOrigin::Memory => Self::Fresh {
                value,
                fetched_at: read.fetched_at,
            },
            _ => Self::Stale {
                value,
                fetched_at: read.fetched_at,
                origin: read.origin,
            },
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Fresh { value, .. } | Self::Stale { value, .. } => Some(value),
            Self::Unavailable => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Fresh { value, .. } | Self::Stale { value, .. } => Some(value),
            Self::Unavailable => None,
        }
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Fresh { fetched_at, .. } | Self::Stale { fetched_at, .. } => Some(*fetched_at),
            Self::Unavailable => None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh { .. })
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PriceView<U> {
        match self {
            Self::Fresh { value, fetched_at } => PriceView::Fresh {
                value: f(value),
                fetched_at,
            },
            Self::Stale {
                value,
                fetched_at,
                origin,
            } => PriceView::Stale {
                value: f(value),
                fetched_at,
                origin,
            },
            Self::Unavailable => PriceView::Unavailable,
        }
    }
}
