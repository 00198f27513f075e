//! Chart derivation: bucket aggregation and axis label layout.
//!
//! Both halves are pure and parameterized by [`Period`](scrapmarket_market_data::Period).

mod aggregator;
mod labels;

pub use aggregator::ChartAggregator;
pub use labels::{
    compact_label, LabelLayoutEngine, LabelPlan, LabelProfile, PixelBudget, PlannedLabel,
};
