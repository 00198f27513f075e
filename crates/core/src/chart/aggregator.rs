use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use scrapmarket_market_data::{ChangeType, ChartBucket, Period, PricePoint};

use crate::constants::DISPLAY_DECIMAL_PLACES;

/// Round for display: 2 places, midpoint away from zero.
fn round_display(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DISPLAY_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

struct Accumulator {
    start: NaiveDate,
    sum: Decimal,
    min: Decimal,
    max: Decimal,
    count: u32,
}

impl Accumulator {
    fn new(start: NaiveDate, price: Decimal) -> Self {
        Self {
            start,
            sum: price,
            min: price,
            max: price,
            count: 1,
        }
    }

    fn push(&mut self, price: Decimal) {
        self.sum += price;
        self.min = self.min.min(price);
        self.max = self.max.max(price);
        self.count += 1;
    }

    fn average(&self) -> Decimal {
        self.sum / Decimal::from(self.count)
    }
}

/// Reduces daily price points into calendar buckets.
pub struct ChartAggregator;

impl ChartAggregator {
    /// Bucket `points` by `period`.
    ///
    /// Output is chronological, one bucket per calendar period that has at
    /// least one sample. `avg_price` is rounded to 2 places; `change_percent`
    /// compares unrounded averages against the preceding bucket and is 0
    /// (`Unchanged`) for the first bucket or when the predecessor averaged 0.
    /// The result does not depend on input order.
    pub fn aggregate(points: &[PricePoint], period: Period) -> Vec<ChartBucket> {
        let mut sorted: Vec<&PricePoint> = points.iter().collect();
        sorted.sort_by(|a, b| {
            a.observed_date
                .cmp(&b.observed_date)
                .then_with(|| a.price.cmp(&b.price))
        });

        let mut groups: Vec<Accumulator> = Vec::new();
        for point in sorted {
            let start = period.bucket_start(point.observed_date);
            match groups.last_mut() {
                Some(current) if current.start == start => current.push(point.price),
                _ => groups.push(Accumulator::new(start, point.price)),
            }
        }

        let mut previous_avg: Option<Decimal> = None;
        groups
            .into_iter()
            .map(|group| {
                let avg = group.average();
                let change_percent = match previous_avg {
                    Some(prev) if !prev.is_zero() => {
                        round_display((avg - prev) / prev * Decimal::ONE_HUNDRED)
                    }
                    _ => Decimal::ZERO,
                };
                previous_avg = Some(avg);

                ChartBucket {
                    period,
                    period_start: group.start,
                    label: period.format_label(group.start),
                    avg_price: round_display(avg),
                    min_price: group.min,
                    max_price: group.max,
                    change_percent,
                    change_type: ChangeType::from_percent(Some(change_percent)),
                    sample_count: group.count,
                }
            })
            .collect()
    }
}
