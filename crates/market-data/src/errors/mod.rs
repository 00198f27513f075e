//! Error types and failure classification for the market data crate.
//!
//! This module provides:
//! - [`FetchError`]: the raw, unclassified failure surfaced by a remote source
//! - [`ValidationError`]: a model invariant violated at the transform boundary
//! - [`ErrorClassifier`], [`ClassifiedError`] and [`ErrorKind`]: the normalized
//!   verdict used by the retry scheduler and shown to users

mod classify;

pub use classify::{ClassifiedError, ErrorClassifier, ErrorKind};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// Maximum number of response body characters kept in a [`FetchError::Status`].
const MAX_BODY_CHARS: usize = 200;

/// Raw failure from a remote price source.
///
/// Sources never classify their own failures; they report what happened on the
/// wire and leave the retry verdict to [`ErrorClassifier`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The connection could not be established (DNS, refused, offline).
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The request did not complete within the client timeout.
    #[error("Request timed out")]
    Timeout,

    /// The server answered with a non-success status code.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Truncated response body
        body: String,
    },

    /// The response body could not be decoded into the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The response decoded but violated a model invariant.
    #[error("Invalid data: {0}")]
    Invalid(#[from] ValidationError),

    /// Any other transport failure.
    #[error("Request failed: {0}")]
    Other(String),
}

impl FetchError {
    /// Build a status error, truncating the body so logs stay readable.
    pub fn status(status: u16, body: impl AsRef<str>) -> Self {
        let body: String = body.as_ref().chars().take(MAX_BODY_CHARS).collect();
        Self::Status { status, body }
    }

    /// Classify this failure. Shorthand for [`ErrorClassifier::classify`].
    pub fn classify(&self) -> ClassifiedError {
        ErrorClassifier::classify(self)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() {
            Self::Connect(error.to_string())
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else if let Some(status) = error.status() {
            Self::status(status.as_u16(), error.to_string())
        } else {
            Self::Other(error.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}

/// A model invariant that rejected incoming data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Instrument code must not be empty")]
    EmptyInstrumentCode,

    #[error("Instrument code '{code}' contains invalid character '{ch}'")]
    InvalidInstrumentChar { code: String, ch: char },

    #[error("Price for {code} on {date} must be positive, got {price}")]
    NonPositivePrice {
        code: String,
        date: NaiveDate,
        price: Decimal,
    },

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Unknown period '{0}'")]
    UnknownPeriod(String),

    #[error("Bucket starting {period_start} has no samples")]
    EmptyBucket { period_start: NaiveDate },

    #[error("Bucket starting {period_start} violates min <= avg <= max")]
    InvalidBucketRange { period_start: NaiveDate },
}
