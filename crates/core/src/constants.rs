//! Default tuning values for price synchronization.

/// Latest prices become stale after 5 minutes.
pub const LATEST_STALE_AFTER_SECS: u64 = 5 * 60;

/// Latest prices expire after 1 hour.
pub const LATEST_EXPIRE_AFTER_SECS: u64 = 60 * 60;

/// History and bucket stats become stale after 1 hour.
pub const HISTORY_STALE_AFTER_SECS: u64 = 60 * 60;

/// History and bucket stats expire after 24 hours.
pub const HISTORY_EXPIRE_AFTER_SECS: u64 = 24 * 60 * 60;

/// Foreground polling interval.
pub const FOREGROUND_POLL_SECS: u64 = 60;

/// Interval multiplier applied in low-power mode.
pub const LOW_POWER_MULTIPLIER: u32 = 5;

/// Days of daily history fetched per instrument.
pub const DEFAULT_HISTORY_DAYS: u32 = 365;

/// Bucket stats fetched per chart request when no history is cached.
pub const DEFAULT_BUCKET_LIMIT: u32 = 12;

/// Request timeout for the remote price API.
pub const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Decimal places kept for averages and percentages.
pub const DISPLAY_DECIMAL_PLACES: u32 = 2;
