//! Market data models.

mod bucket;
mod instrument;
mod price_point;

pub use bucket::{ChartBucket, Period};
pub use instrument::{InstrumentCode, SUPPORTED_INSTRUMENTS};
pub use price_point::{ChangeType, PricePoint};
