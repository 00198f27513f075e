//! Scrapmarket Core - price cache, polling and chart derivation.
//!
//! ```text
//! PollingScheduler ──> CacheRefresher ──> RemoteDataSource (retry + classify)
//!                            │
//!                            v
//!                       CacheStore ──> backup
//!                            │
//!                            v
//! PriceService::{latest, history, chart} ──> ChartAggregator ──> LabelLayoutEngine
//! ```
//!
//! Network access goes through `scrapmarket-market-data`; this crate owns
//! every piece of mutable state and exposes synchronous cache reads.

pub mod cache;
pub mod chart;
pub mod clock;
pub mod config;
pub mod constants;
pub mod errors;
pub mod polling;
pub mod prices;

pub use cache::{
    BackupStore, BackupWriteMode, CacheKey, CacheRead, CacheStore, FileBackupStore, Freshness,
    FreshnessPolicy, InMemoryBackupStore, PriceSnapshot, ReadOrigin,
};
pub use chart::{ChartAggregator, LabelLayoutEngine, LabelPlan, PixelBudget};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::PriceSyncConfig;
pub use errors::{BackupError, ConfigError, LayoutError};
pub use polling::{PollState, PollingScheduler, PowerMode, RefreshOutcome, RuntimeProfile};
pub use prices::{CacheRefresher, PriceService, PriceServiceTrait, PriceView};
