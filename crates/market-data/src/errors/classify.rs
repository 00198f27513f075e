use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::FetchError;

/// Normalized failure taxonomy.
///
/// | Kind | Retryable |
/// |------|-----------|
/// | `NetworkUnreachable` | yes |
/// | `Timeout` | yes |
/// | `ServerError(status)` | yes |
/// | `AuthRequired` | no |
/// | `NotFound` | no |
/// | `ValidationFailed` | no |
/// | `Unknown` | no |
/// | `Cancelled` | no |
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum ErrorKind {
    NetworkUnreachable,
    Timeout,
    ServerError(u16),
    AuthRequired,
    NotFound,
    ValidationFailed,
    Unknown,
    /// The caller stopped the operation between attempts.
    Cancelled,
}

impl ErrorKind {
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::NetworkUnreachable | Self::Timeout | Self::ServerError(_)
        )
    }

    /// Stable machine-readable code.
    pub const fn code(self) -> &'static str {
        match self {
            Self::NetworkUnreachable => "network_unreachable",
            Self::Timeout => "timeout",
            Self::ServerError(_) => "server_error",
            Self::AuthRequired => "auth_required",
            Self::NotFound => "not_found",
            Self::ValidationFailed => "validation_failed",
            Self::Unknown => "unknown",
            Self::Cancelled => "cancelled",
        }
    }

    /// Message suitable for showing next to a price list or chart.
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::NetworkUnreachable => "No network connection. Showing the last known prices.",
            Self::Timeout => "The price server took too long to respond.",
            Self::ServerError(_) => "The price server is having trouble. Please try again later.",
            Self::AuthRequired => "Please sign in again to load prices.",
            Self::NotFound => "Price data is not available for this item.",
            Self::ValidationFailed => "Received price data could not be read.",
            Self::Unknown => "Something went wrong while loading prices.",
            Self::Cancelled => "Price refresh was cancelled.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerError(status) => write!(f, "server_error({})", status),
            other => f.write_str(other.code()),
        }
    }
}

/// A failure after classification.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
#[error("{kind}: {detail}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub retryable: bool,
    pub user_message: String,
    /// Technical detail from the raw failure, for logs only.
    pub detail: String,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            retryable: kind.is_retryable(),
            user_message: kind.user_message().to_string(),
            detail: detail.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation cancelled")
    }
}

/// Pure mapping from raw fetch failures to [`ClassifiedError`].
///
/// No I/O; the same raw error always yields the same verdict.
#[derive(Clone, Copy, Debug, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn classify(error: &FetchError) -> ClassifiedError {
        let kind = match error {
            FetchError::Connect(_) => ErrorKind::NetworkUnreachable,
            FetchError::Timeout => ErrorKind::Timeout,
            FetchError::Status { status, .. } => Self::kind_for_status(*status),
            FetchError::Decode(_) | FetchError::Invalid(_) => ErrorKind::ValidationFailed,
            FetchError::Other(_) => ErrorKind::Unknown,
        };
        ClassifiedError::new(kind, error.to_string())
    }

    /// Map an HTTP status to a kind.
    ///
    /// 429 is treated as a server-side condition so it backs off like a 5xx.
    pub fn kind_for_status(status: u16) -> ErrorKind {
        match status {
            401 | 403 => ErrorKind::AuthRequired,
            404 | 410 => ErrorKind::NotFound,
            408 => ErrorKind::Timeout,
            429 | 500..=599 => ErrorKind::ServerError(status),
            400..=499 => ErrorKind::ValidationFailed,
            _ => ErrorKind::Unknown,
        }
    }
}
