//! Property-based integration tests for chart aggregation and label layout.
//!
//! These tests verify that universal properties hold across all valid inputs,
//! using the `proptest` crate for random test case generation.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use rust_decimal::Decimal;
use scrapmarket_core::chart::{ChartAggregator, LabelLayoutEngine, PixelBudget};
use scrapmarket_market_data::{InstrumentCode, Period, PricePoint};

// =============================================================================
// Generators
// =============================================================================

fn arb_period() -> impl Strategy<Value = Period> {
    prop_oneof![
        Just(Period::Daily),
        Just(Period::Weekly),
        Just(Period::Monthly),
    ]
}

/// A price point within roughly two years, priced in whole cents.
fn arb_point() -> impl Strategy<Value = PricePoint> {
    (0i64..730, 1i64..5_000_000).prop_map(|(offset, cents)| {
        let base = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        PricePoint::new(
            InstrumentCode::parse("CU").unwrap(),
            base + Duration::days(offset),
            Decimal::new(cents, 2),
            None,
            None,
        )
        .unwrap()
    })
}

fn arb_points(max_count: usize) -> impl Strategy<Value = Vec<PricePoint>> {
    proptest::collection::vec(arb_point(), 0..=max_count)
}

fn arb_labels(max_count: usize) -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("20[0-9]{2}/[01][0-9]/[0-3][0-9]", 0..=max_count)
}

// =============================================================================
// Aggregation properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Every input point lands in exactly one bucket.
    #[test]
    fn prop_sample_counts_cover_input(points in arb_points(120), period in arb_period()) {
        let buckets = ChartAggregator::aggregate(&points, period);
        let total: u32 = buckets.iter().map(|b| b.sample_count).sum();
        prop_assert_eq!(total as usize, points.len());

        for point in &points {
            let owners = buckets
                .iter()
                .filter(|b| b.period_start <= point.observed_date && point.observed_date < b.period_end())
                .count();
            prop_assert_eq!(owners, 1);
        }
    }

    /// Buckets are ascending, non-overlapping and internally consistent.
    #[test]
    fn prop_buckets_are_ordered_and_disjoint(points in arb_points(120), period in arb_period()) {
        let buckets = ChartAggregator::aggregate(&points, period);

        for bucket in &buckets {
            prop_assert!(bucket.sample_count >= 1);
            prop_assert!(bucket.min_price <= bucket.avg_price);
            prop_assert!(bucket.avg_price <= bucket.max_price);
            prop_assert_eq!(period.bucket_start(bucket.period_start), bucket.period_start);
        }
        for pair in buckets.windows(2) {
            prop_assert!(pair[0].period_end() <= pair[1].period_start);
        }
    }

    /// Shuffling the input or aggregating twice changes nothing.
    #[test]
    fn prop_aggregate_is_order_independent(points in arb_points(80), period in arb_period()) {
        let expected = ChartAggregator::aggregate(&points, period);

        let mut reversed = points.clone();
        reversed.reverse();
        prop_assert_eq!(&ChartAggregator::aggregate(&reversed, period), &expected);
        prop_assert_eq!(&ChartAggregator::aggregate(&points, period), &expected);
    }

    /// A bucket built from one sample has min = max = avg.
    #[test]
    fn prop_single_sample_bucket_is_flat(point in arb_point(), period in arb_period()) {
        let buckets = ChartAggregator::aggregate(std::slice::from_ref(&point), period);
        prop_assert_eq!(buckets.len(), 1);
        prop_assert_eq!(buckets[0].min_price, point.price);
        prop_assert_eq!(buckets[0].max_price, point.price);
        prop_assert_eq!(buckets[0].avg_price, point.price);
        prop_assert_eq!(buckets[0].change_percent, Decimal::ZERO);
    }
}

// =============================================================================
// Label layout properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Over capacity: first and last are visible and exactly `capacity` are shown.
    #[test]
    fn prop_label_plan_respects_capacity(
        labels in arb_labels(60),
        width in 1u32..2000,
        spacing in 0u32..40,
        label_width in 1u32..120,
        period in arb_period(),
    ) {
        let budget = PixelBudget::new(width, spacing, label_width).unwrap();
        let engine = LabelLayoutEngine::for_period(period);
        let plan = engine.plan(&labels, &budget);
        let n = labels.len();

        prop_assert_eq!(plan.labels.len(), n);
        prop_assert_eq!(plan.capacity, engine.capacity(&budget));

        let visible: Vec<usize> = plan.visible().map(|l| l.index).collect();
        if n <= plan.capacity {
            prop_assert_eq!(visible.len(), n);
        } else {
            prop_assert_eq!(visible.len(), plan.capacity);
            prop_assert_eq!(visible.first().copied(), Some(0));
            prop_assert_eq!(visible.last().copied(), Some(n - 1));
        }
        for pair in visible.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
    }
}
