use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use log::warn;

use crate::cache::CacheKey;

/// Keys with a fetch currently in flight.
#[derive(Clone, Debug, Default)]
pub struct InFlightRegistry {
    keys: Arc<Mutex<HashSet<CacheKey>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn keys(&self) -> MutexGuard<'_, HashSet<CacheKey>> {
        self.keys.lock().unwrap_or_else(|poisoned| {
            warn!("In-flight lock was poisoned. Recovering.");
            poisoned.into_inner()
        })
    }

    /// Claim `key`. Returns `None` if a fetch for it is already running.
    pub fn try_acquire(&self, key: &CacheKey) -> Option<InFlightGuard> {
        if self.keys().insert(key.clone()) {
            Some(InFlightGuard {
                registry: self.clone(),
                key: key.clone(),
            })
        } else {
            None
        }
    }

    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.keys().contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }
}

/// Releases its key on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    registry: InFlightRegistry,
    key: CacheKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.keys().remove(&self.key);
    }
}
