//! Remote price sources.
//!
//! This module contains:
//! - The [`RemoteDataSource`] trait every backend implements
//! - [`HttpPriceSource`], the JSON-over-HTTPS backend used in production

mod traits;

pub mod price_api;

pub use price_api::HttpPriceSource;
pub use traits::RemoteDataSource;
