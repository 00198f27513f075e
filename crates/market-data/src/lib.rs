//! Scrapmarket Market Data Crate
//!
//! Provider-facing half of the scrap-metal price pipeline: what a price is,
//! where it comes from, and how a failed fetch is judged and retried.
//!
//! # Architecture
//!
//! ```text
//! +--------------------+
//! |  RemoteDataSource  |  (HttpPriceSource, test doubles)
//! +--------------------+
//!           |
//!           | Result<_, FetchError>
//!           v
//! +--------------------+     +--------------------+
//! |   RetryScheduler   | --> |  ErrorClassifier   |  (pure, deterministic)
//! +--------------------+     +--------------------+
//!           |
//!           | Result<_, ClassifiedError>
//!           v
//!     cache layer (scrapmarket-core)
//! ```
//!
//! # Core Types
//!
//! - [`InstrumentCode`] - Normalized commodity code ("CU", "AL_CAN", ...)
//! - [`PricePoint`] - One daily price observation
//! - [`ChartBucket`] - One aggregated chart bucket for a [`Period`]
//! - [`ClassifiedError`] - A failure with its [`ErrorKind`] and retry verdict

pub mod errors;
pub mod models;
pub mod provider;
pub mod retry;

pub use errors::{ClassifiedError, ErrorClassifier, ErrorKind, FetchError, ValidationError};
pub use models::{
    ChangeType, ChartBucket, InstrumentCode, Period, PricePoint, SUPPORTED_INSTRUMENTS,
};
pub use provider::{HttpPriceSource, RemoteDataSource};
pub use retry::{
    CancelHandle, CancelSignal, RetryAttempt, RetryPolicy, RetryReport, RetryScheduler,
};
