//! Freshness-aware price cache.
//!
//! ```text
//!            put / commit                 now >= stale_at          now >= expires_at
//! (absent) ───────────────> Fresh ───────────────────> Stale ──────────────────> Expired
//!                             ^                          │                          │
//!                             └──────── commit ──────────┴────────── commit ────────┘
//! ```
//!
//! Expired entries are not served from memory; reads fall back to the
//! [`BackupStore`] and report the result as stale.

mod backup;
mod entry;
mod key;
mod store;

pub use backup::{BackupStore, FileBackupStore, InMemoryBackupStore};
pub use entry::{CacheEntry, Freshness, FreshnessPolicy};
pub use key::{CacheKey, DataKind, PriceSnapshot};
pub use store::{BackupWriteMode, CacheRead, CacheStore, CommitOutcome, FetchTicket, ReadOrigin};
