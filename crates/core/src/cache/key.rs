use std::fmt;

use scrapmarket_market_data::{ChartBucket, InstrumentCode, Period, PricePoint};
use serde::{Deserialize, Serialize};

/// Identity of one cached dataset.
///
/// The [`Display`](fmt::Display) form is stable and doubles as the backup
/// store key, e.g. `latest`, `history:CU:365`, `stats:AL:weekly:12`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    /// Latest price for every tracked instrument.
    Latest,
    History {
        code: InstrumentCode,
        days: u32,
    },
    BucketStats {
        code: InstrumentCode,
        period: Period,
        limit: u32,
    },
}

impl CacheKey {
    pub fn history(code: InstrumentCode, days: u32) -> Self {
        Self::History { code, days }
    }

    pub fn bucket_stats(code: InstrumentCode, period: Period, limit: u32) -> Self {
        Self::BucketStats {
            code,
            period,
            limit,
        }
    }

    pub fn kind(&self) -> DataKind {
        match self {
            Self::Latest => DataKind::Latest,
            Self::History { .. } => DataKind::History,
            Self::BucketStats { .. } => DataKind::BucketStats,
        }
    }

    pub fn storage_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::History { code, days } => write!(f, "history:{}:{}", code, days),
            Self::BucketStats {
                code,
                period,
                limit,
            } => write!(f, "stats:{}:{}:{}", code, period, limit),
        }
    }
}

/// Category of cached data, used to pick freshness windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataKind {
    Latest,
    History,
    BucketStats,
}

/// Value stored in the price cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PriceSnapshot {
    Points(Vec<PricePoint>),
    Buckets(Vec<ChartBucket>),
}

impl PriceSnapshot {
    pub fn len(&self) -> usize {
        match self {
            Self::Points(points) => points.len(),
            Self::Buckets(buckets) => buckets.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_points(self) -> Option<Vec<PricePoint>> {
        match self {
            Self::Points(points) => Some(points),
            Self::Buckets(_) => None,
        }
    }

    pub fn into_buckets(self) -> Option<Vec<ChartBucket>> {
        match self {
            Self::Buckets(buckets) => Some(buckets),
            Self::Points(_) => None,
        }
    }
}
