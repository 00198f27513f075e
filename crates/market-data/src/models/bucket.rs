//! Chart periods and aggregated buckets.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ChangeType;
use crate::errors::ValidationError;

/// Aggregation granularity for charts.
///
/// Weeks start on Monday; months are calendar months.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
}

impl Period {
    pub const ALL: [Period; 3] = [Period::Daily, Period::Weekly, Period::Monthly];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// First day of the bucket containing `date`.
    pub fn bucket_start(self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Daily => date,
            Self::Weekly => {
                let offset = u64::from(date.weekday().num_days_from_monday());
                date.checked_sub_days(Days::new(offset)).unwrap_or(date)
            }
            Self::Monthly => date.with_day(1).unwrap_or(date),
        }
    }

    /// First day of the bucket after the one starting at `start`.
    pub fn next_start(self, start: NaiveDate) -> NaiveDate {
        let next = match self {
            Self::Daily => start.succ_opt(),
            Self::Weekly => start.checked_add_days(Days::new(7)),
            Self::Monthly => start.checked_add_months(Months::new(1)),
        };
        next.unwrap_or(NaiveDate::MAX)
    }

    /// Full-length label for the bucket starting at `start`.
    ///
    /// Daily and weekly labels are `YYYY/MM/DD`; monthly labels are `YYYY/MM`.
    pub fn format_label(self, start: NaiveDate) -> String {
        match self {
            Self::Daily | Self::Weekly => start.format("%Y/%m/%d").to_string(),
            Self::Monthly => start.format("%Y/%m").to_string(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" | "d" => Ok(Self::Daily),
            "weekly" | "week" | "w" => Ok(Self::Weekly),
            "monthly" | "month" | "m" => Ok(Self::Monthly),
            other => Err(ValidationError::UnknownPeriod(other.to_string())),
        }
    }
}

/// One aggregated chart bucket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartBucket {
    pub period: Period,
    pub period_start: NaiveDate,
    pub label: String,
    pub avg_price: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
    /// Change of `avg_price` against the previous bucket, in percent.
    pub change_percent: Decimal,
    pub change_type: ChangeType,
    pub sample_count: u32,
}

impl ChartBucket {
    /// Exclusive end of this bucket.
    pub fn period_end(&self) -> NaiveDate {
        self.period.next_start(self.period_start)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sample_count == 0 {
            return Err(ValidationError::EmptyBucket {
                period_start: self.period_start,
            });
        }
        let ordered = self.min_price <= self.avg_price && self.avg_price <= self.max_price;
        if !ordered || self.min_price <= Decimal::ZERO {
            return Err(ValidationError::InvalidBucketRange {
                period_start: self.period_start,
            });
        }
        Ok(())
    }
}
