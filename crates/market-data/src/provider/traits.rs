//! Remote price source trait.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::errors::FetchError;
use crate::models::{ChartBucket, InstrumentCode, Period, PricePoint};

/// A remote backend that serves scrap-metal prices.
///
/// Implementations report raw failures as [`FetchError`] and never classify
/// or retry on their own. Every returned point or bucket must already satisfy
/// the model invariants; a response with any invalid element fails as a whole
/// with [`FetchError::Invalid`].
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use scrapmarket_market_data::provider::RemoteDataSource;
///
/// struct FixtureSource;
///
/// #[async_trait]
/// impl RemoteDataSource for FixtureSource {
///     fn id(&self) -> &'static str {
///         "FIXTURE"
///     }
///
///     // ... implement fetch methods
/// }
/// ```
#[async_trait]
pub trait RemoteDataSource: Send + Sync {
    /// Constant identifier used in logs, e.g. "SCRAP_PRICE_API".
    fn id(&self) -> &'static str;

    /// Latest price for each requested instrument.
    ///
    /// Instruments the backend does not know are omitted from the result.
    async fn fetch_latest(
        &self,
        codes: &BTreeSet<InstrumentCode>,
    ) -> Result<Vec<PricePoint>, FetchError>;

    /// Daily history for one instrument covering the last `days` days,
    /// ordered by date ascending.
    async fn fetch_history(
        &self,
        code: &InstrumentCode,
        days: u32,
    ) -> Result<Vec<PricePoint>, FetchError>;

    /// Pre-aggregated buckets computed by the backend, oldest first,
    /// at most `limit` entries.
    async fn fetch_bucket_stats(
        &self,
        code: &InstrumentCode,
        period: Period,
        limit: u32,
    ) -> Result<Vec<ChartBucket>, FetchError>;
}
