use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use log::{debug, info, warn};
use scrapmarket_market_data::{
    CancelSignal, ClassifiedError, ErrorKind, InstrumentCode, RemoteDataSource, RetryScheduler,
};

use crate::cache::{CacheKey, CacheStore, CommitOutcome, PriceSnapshot};
use crate::config::PriceSyncConfig;
use crate::polling::{InFlightRegistry, RefreshOutcome, Refresher};

/// Fetches one cache key from the remote source under the retry policy and
/// commits the result.
///
/// Every fetch path (polling loops, stale-read nudges, `refresh_now`) goes
/// through the same in-flight registry, so a key is never fetched twice at
/// once.
pub struct CacheRefresher {
    source: Arc<dyn RemoteDataSource>,
    cache: Arc<CacheStore<PriceSnapshot>>,
    retry: RetryScheduler,
    in_flight: InFlightRegistry,
    tracked: BTreeSet<InstrumentCode>,
    config: PriceSyncConfig,
    last_errors: Mutex<HashMap<CacheKey, ClassifiedError>>,
}

impl CacheRefresher {
    pub fn new(
        source: Arc<dyn RemoteDataSource>,
        cache: Arc<CacheStore<PriceSnapshot>>,
        config: &PriceSyncConfig,
    ) -> Self {
        Self {
            source,
            cache,
            retry: RetryScheduler::new(config.retry.policy()),
            in_flight: InFlightRegistry::new(),
            tracked: config.instruments.iter().cloned().collect(),
            config: config.clone(),
            last_errors: Mutex::new(HashMap::new()),
        }
    }

    fn errors(&self) -> MutexGuard<'_, HashMap<CacheKey, ClassifiedError>> {
        self.last_errors.lock().unwrap_or_else(|poisoned| {
            warn!("Refresh error lock was poisoned. Recovering.");
            poisoned.into_inner()
        })
    }

    pub fn tracked(&self) -> &BTreeSet<InstrumentCode> {
        &self.tracked
    }

    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.in_flight.is_in_flight(key)
    }

    /// Most recent failure for `key`, cleared by the next success.
    pub fn last_error(&self, key: &CacheKey) -> Option<ClassifiedError> {
        self.errors().get(key).cloned()
    }

    async fn fetch(
        &self,
        key: &CacheKey,
        cancel: &CancelSignal,
    ) -> Result<PriceSnapshot, ClassifiedError> {
        let source = self.source.as_ref();
        match key {
            CacheKey::Latest => {
                let codes = &self.tracked;
                self.retry
                    .run(|| source.fetch_latest(codes), cancel)
                    .await
                    .map(PriceSnapshot::Points)
            }
            CacheKey::History { code, days } => self
                .retry
                .run(|| source.fetch_history(code, *days), cancel)
                .await
                .map(PriceSnapshot::Points),
            CacheKey::BucketStats {
                code,
                period,
                limit,
            } => self
                .retry
                .run(|| source.fetch_bucket_stats(code, *period, *limit), cancel)
                .await
                .map(PriceSnapshot::Buckets),
        }
    }
}

#[async_trait]
impl Refresher for CacheRefresher {
    async fn refresh(&self, key: &CacheKey, cancel: CancelSignal) -> RefreshOutcome {
        let Some(_guard) = self.in_flight.try_acquire(key) else {
            debug!("Skipping {}: fetch already in flight", key);
            return RefreshOutcome::AlreadyInFlight;
        };

        let ticket = self.cache.begin_fetch();
        debug!("Refreshing {} from {}", key, self.source.id());

        match self.fetch(key, &cancel).await {
            Ok(snapshot) => {
                let count = snapshot.len();
                let policy = self.config.freshness_for(key.kind());
                self.errors().remove(key);
                match self.cache.commit(key.clone(), ticket, snapshot, policy) {
                    CommitOutcome::Committed => {
                        info!("Refreshed {} ({} records)", key, count);
                        RefreshOutcome::Committed
                    }
                    CommitOutcome::Discarded => {
                        debug!("Discarded out-of-order result for {}", key);
                        RefreshOutcome::Discarded
                    }
                }
            }
            Err(error) => {
                if error.kind == ErrorKind::Cancelled {
                    debug!("Refresh of {} cancelled", key);
                } else {
                    warn!("Refresh of {} failed: {}", key, error);
                    self.errors().insert(key.clone(), error.clone());
                }
                RefreshOutcome::Failed(error)
            }
        }
    }
}
