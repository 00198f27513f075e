use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::backup::BackupStore;
use super::entry::{CacheEntry, Freshness, FreshnessPolicy};
use super::key::CacheKey;
use crate::clock::Clock;

/// Where a cache read was served from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadOrigin {
    Memory,
    Backup,
}

/// A servable value with the metadata callers need to mark staleness.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheRead<T> {
    pub value: T,
    pub origin: ReadOrigin,
    pub freshness: Freshness,
    pub fetched_at: DateTime<Utc>,
}

/// Sequence number taken when a fetch starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket {
    seq: u64,
}

impl FetchTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Result of committing a fetched value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// A value from a later-started fetch was already committed.
    Discarded,
}

/// How backup snapshots are written after a commit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackupWriteMode {
    /// On the blocking pool when a Tokio runtime is available, inline otherwise.
    #[default]
    Background,
    Inline,
}

/// Highest entry sequence number written to the backup, per storage key.
type BackupLedger = Arc<Mutex<HashMap<String, u64>>>;

fn lock_ledger(ledger: &BackupLedger) -> MutexGuard<'_, HashMap<String, u64>> {
    ledger.lock().unwrap_or_else(|poisoned| {
        warn!("Backup ledger lock was poisoned. Recovering.");
        poisoned.into_inner()
    })
}

/// Freshness-aware cache with an optional durable backup.
///
/// The store exclusively owns entry lifecycle. Writes per key are ordered by
/// fetch-start sequence number: a completion whose fetch started before the
/// currently committed value's fetch is discarded. Backup writes follow the
/// same order, so a background write never replaces a newer snapshot. They
/// are best effort; their failures are logged and never fail the primary
/// write.
pub struct CacheStore<T> {
    entries: RwLock<HashMap<CacheKey, CacheEntry<T>>>,
    backup: Option<Arc<dyn BackupStore>>,
    backup_mode: BackupWriteMode,
    backup_ledger: BackupLedger,
    clock: Arc<dyn Clock>,
    next_seq: AtomicU64,
}

impl<T> CacheStore<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            backup: None,
            backup_mode: BackupWriteMode::default(),
            backup_ledger: Arc::new(Mutex::new(HashMap::new())),
            clock,
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn with_backup(mut self, backup: Arc<dyn BackupStore>, mode: BackupWriteMode) -> Self {
        self.backup = Some(backup);
        self.backup_mode = mode;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<CacheKey, CacheEntry<T>>> {
        self.entries.read().unwrap_or_else(|poisoned| {
            warn!("Cache lock was poisoned. Recovering.");
            poisoned.into_inner()
        })
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<CacheKey, CacheEntry<T>>> {
        self.entries.write().unwrap_or_else(|poisoned| {
            warn!("Cache lock was poisoned. Recovering.");
            poisoned.into_inner()
        })
    }

    /// Raw in-memory entry, whatever its freshness.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        self.read_entries().get(key).cloned()
    }

    pub fn freshness(&self, key: &CacheKey) -> Option<Freshness> {
        let now = self.clock.now();
        self.read_entries().get(key).map(|e| e.freshness_at(now))
    }

    /// Servable value for `key`.
    ///
    /// Fresh or stale memory entries are returned as is. On a miss or an
    /// expired entry the backup is consulted; a backup hit is reported as
    /// `Stale` with [`ReadOrigin::Backup`] regardless of its age.
    pub fn get_or_backup(&self, key: &CacheKey) -> Option<CacheRead<T>> {
        let now = self.clock.now();
        if let Some(entry) = self.read_entries().get(key) {
            let freshness = entry.freshness_at(now);
            if freshness.is_servable() {
                return Some(CacheRead {
                    value: entry.value.clone(),
                    origin: ReadOrigin::Memory,
                    freshness,
                    fetched_at: entry.fetched_at,
                });
            }
        }

        let entry = self.load_backup(key)?;
        Some(CacheRead {
            value: entry.value,
            origin: ReadOrigin::Backup,
            freshness: Freshness::Stale,
            fetched_at: entry.fetched_at,
        })
    }

    fn load_backup(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        let backup = self.backup.as_ref()?;
        let storage_key = key.storage_key();
        let payload = match backup.load(&storage_key) {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(e) => {
                warn!("Backup read failed for {}: {}", storage_key, e);
                return None;
            }
        };
        match serde_json::from_str::<CacheEntry<T>>(&payload) {
            Ok(entry) => {
                debug!("Serving {} from backup", storage_key);
                Some(entry)
            }
            Err(e) => {
                warn!("Discarding unreadable backup for {}: {}", storage_key, e);
                None
            }
        }
    }

    /// Take a sequence number at fetch start.
    pub fn begin_fetch(&self) -> FetchTicket {
        FetchTicket {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
        }
    }

    /// Unconditionally commit `value` as a fresh entry.
    pub fn put(&self, key: CacheKey, value: T, policy: FreshnessPolicy) {
        let ticket = self.begin_fetch();
        // A brand-new ticket is newer than anything committed.
        let _ = self.commit(key, ticket, value, policy);
    }

    /// Commit a fetched value unless a later-started fetch already committed.
    pub fn commit(
        &self,
        key: CacheKey,
        ticket: FetchTicket,
        value: T,
        policy: FreshnessPolicy,
    ) -> CommitOutcome {
        let entry = CacheEntry::new(value, self.clock.now(), policy, ticket.seq);
        let snapshot = self.backup.as_ref().and_then(|_| match serde_json::to_string(&entry) {
            Ok(json) => Some(json),
            Err(e) => {
                warn!("Could not serialize backup for {}: {}", key, e);
                None
            }
        });

        {
            let mut entries = self.write_entries();
            if let Some(existing) = entries.get(&key) {
                if existing.seq > ticket.seq {
                    debug!(
                        "Discarding result for {} (fetch #{} older than committed #{})",
                        key, ticket.seq, existing.seq
                    );
                    return CommitOutcome::Discarded;
                }
            }
            entries.insert(key.clone(), entry);
        }

        if let Some(payload) = snapshot {
            self.write_backup(key.storage_key(), ticket.seq, payload);
        }
        CommitOutcome::Committed
    }

    fn write_backup(&self, storage_key: String, seq: u64, payload: String) {
        let Some(backup) = self.backup.clone() else {
            return;
        };
        let ledger = self.backup_ledger.clone();
        let write = move || {
            // Held across the save: writes land one at a time, newest wins.
            let mut written = lock_ledger(&ledger);
            if written.get(&storage_key).is_some_and(|&last| last >= seq) {
                debug!("Skipping outdated backup of {} (#{})", storage_key, seq);
                return;
            }
            match backup.save(&storage_key, &payload) {
                Ok(()) => {
                    written.insert(storage_key, seq);
                }
                Err(e) => warn!("Backup write failed for {}: {}", storage_key, e),
            }
        };
        match (self.backup_mode, tokio::runtime::Handle::try_current()) {
            (BackupWriteMode::Background, Ok(handle)) => {
                handle.spawn_blocking(write);
            }
            _ => write(),
        }
    }

    /// Drop an entry from memory and backup.
    pub fn remove(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        let removed = self.write_entries().remove(key);
        if let Some(backup) = &self.backup {
            let storage_key = key.storage_key();
            let mut written = lock_ledger(&self.backup_ledger);
            // Pending writes from earlier commits must not resurrect the key.
            let issued = self.next_seq.load(Ordering::SeqCst).saturating_sub(1);
            if let Err(e) = backup.remove(&storage_key) {
                warn!("Backup remove failed for {}: {}", key, e);
            }
            written.insert(storage_key, issued);
        }
        removed
    }

    /// Drop expired in-memory entries. Backups are kept as the last resort.
    pub fn clear_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.write_entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.freshness_at(now).is_servable());
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }

    /// In-memory keys in sorted order.
    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self.read_entries().keys().cloned().collect();
        keys.sort();
        keys
    }
}
