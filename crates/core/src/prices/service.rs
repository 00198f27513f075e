//! Consumer-facing price queries.
//!
//! Reads are synchronous cache lookups. A stale or missing entry is served
//! (or reported unavailable) immediately and a refresh is requested in the
//! background; only [`PriceService::refresh_now`] waits on the network.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info};
use scrapmarket_market_data::{
    CancelSignal, ChartBucket, ClassifiedError, InstrumentCode, Period, PricePoint,
    RemoteDataSource,
};

use super::refresher::CacheRefresher;
use super::view::PriceView;
use crate::cache::{CacheKey, CacheRead, CacheStore, Freshness, PriceSnapshot};
use crate::chart::{ChartAggregator, LabelLayoutEngine, LabelPlan, PixelBudget};
use crate::config::PriceSyncConfig;
use crate::errors::ConfigError;
use crate::polling::{
    IntervalProvider, PollState, PollingScheduler, RefreshOutcome, Refresher, RuntimeProfile,
};

/// Query interface exposed to chart and list views.
#[async_trait]
pub trait PriceServiceTrait: Send + Sync {
    /// Latest prices for `codes`, or for every tracked instrument when empty.
    fn latest(&self, codes: &[InstrumentCode]) -> PriceView<Vec<PricePoint>>;

    /// Daily history for `code` over the last `days` days.
    fn history(&self, code: &InstrumentCode, days: u32) -> PriceView<Vec<PricePoint>>;

    /// The most recent `limit` buckets for `code`.
    fn chart(&self, code: &InstrumentCode, period: Period, limit: u32)
        -> PriceView<Vec<ChartBucket>>;

    /// Axis labels that fit `budget`.
    fn label_plan(&self, raw_labels: &[String], budget: &PixelBudget, period: Period)
        -> LabelPlan;

    /// Fetch `key` now, waiting for the result.
    async fn refresh_now(&self, key: &CacheKey) -> RefreshOutcome;
}

pub struct PriceService {
    config: PriceSyncConfig,
    cache: Arc<CacheStore<PriceSnapshot>>,
    refresher: Arc<CacheRefresher>,
    scheduler: PollingScheduler,
}

impl PriceService {
    /// Wire the service. Fails on an invalid configuration.
    pub fn new(
        config: PriceSyncConfig,
        source: Arc<dyn RemoteDataSource>,
        cache: Arc<CacheStore<PriceSnapshot>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let refresher = Arc::new(CacheRefresher::new(source, cache.clone(), &config));
        let profile =
            RuntimeProfile::foreground().with_background_refresh(config.poll.background_enabled());
        let scheduler = PollingScheduler::new(refresher.clone(), profile);

        Ok(Self {
            config,
            cache,
            refresher,
            scheduler,
        })
    }

    pub fn config(&self) -> &PriceSyncConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheStore<PriceSnapshot>> {
        &self.cache
    }

    pub fn tracked(&self) -> &BTreeSet<InstrumentCode> {
        self.refresher.tracked()
    }

    /// Keys kept warm by polling: latest prices plus each tracked history.
    pub fn tracked_keys(&self) -> Vec<CacheKey> {
        std::iter::once(CacheKey::Latest)
            .chain(
                self.tracked()
                    .iter()
                    .map(|code| CacheKey::history(code.clone(), self.config.history_days)),
            )
            .collect()
    }

    // =========================================================================
    // Polling control
    // =========================================================================

    /// Start a polling loop for every tracked key. Requires a Tokio runtime.
    pub fn start_polling(&self) {
        let interval: Arc<dyn IntervalProvider> = Arc::new(self.config.poll.interval());
        let keys = self.tracked_keys();
        info!("Starting price polling for {} keys", keys.len());
        for key in keys {
            self.scheduler.start(key, interval.clone());
        }
    }

    pub fn stop_all(&self) {
        self.scheduler.stop_all();
    }

    /// Stop every loop and wait for them to exit.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }

    /// Forward a host runtime change (visibility, power, background refresh).
    pub fn set_profile(&self, profile: RuntimeProfile) {
        self.scheduler.set_profile(profile);
    }

    pub fn profile(&self) -> RuntimeProfile {
        self.scheduler.profile()
    }

    pub fn poll_state(&self, key: &CacheKey) -> PollState {
        self.scheduler.state(key)
    }

    pub fn last_error(&self, key: &CacheKey) -> Option<ClassifiedError> {
        self.refresher.last_error(key)
    }

    /// Refresh every tracked key once, concurrently.
    pub async fn warm_up(&self) -> Vec<(CacheKey, RefreshOutcome)> {
        let keys = self.tracked_keys();
        let outcomes = join_all(
            keys.iter()
                .map(|key| self.refresher.refresh(key, CancelSignal::never())),
        )
        .await;
        keys.into_iter().zip(outcomes).collect()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Cached value for `key`, nudging a refresh unless it is fresh.
    ///
    /// Returns the read and whether a fetch of `key` is now under way.
    fn read(&self, key: &CacheKey) -> (Option<CacheRead<PriceSnapshot>>, bool) {
        let read = self.cache.get_or_backup(key);
        let is_fresh = matches!(&read, Some(r) if r.freshness == Freshness::Fresh);
        let refreshing = !is_fresh && self.request_refresh(key);
        (read, refreshing)
    }

    /// Ask for a background refresh of `key` without waiting.
    ///
    /// A polled key is nudged through its loop; an unpolled key gets a
    /// one-off fetch if the host profile allows refreshing. Returns whether
    /// a fetch of `key` is pending or running afterwards.
    fn request_refresh(&self, key: &CacheKey) -> bool {
        if self.refresher.is_in_flight(key) {
            return true;
        }
        if self.scheduler.is_polling(key) {
            let nudged = self.scheduler.request_refresh(key);
            if nudged {
                debug!("Nudged polling loop for {}", key);
            }
            return nudged;
        }
        if !self.scheduler.profile().allows_refresh() {
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime available to refresh {}", key);
            return false;
        };
        let refresher = self.refresher.clone();
        let key = key.clone();
        runtime.spawn(async move {
            refresher.refresh(&key, CancelSignal::never()).await;
        });
        true
    }
}

#[async_trait]
impl PriceServiceTrait for PriceService {
    fn latest(&self, codes: &[InstrumentCode]) -> PriceView<Vec<PricePoint>> {
        let (Some(read), _) = self.read(&CacheKey::Latest) else {
            return PriceView::Unavailable;
        };
        let Some(points) = read.value.clone().into_points() else {
            return PriceView::Unavailable;
        };
        if codes.is_empty() {
            return PriceView::from_read(read, points);
        }

        let wanted: BTreeSet<&InstrumentCode> = codes.iter().collect();
        let selected: Vec<PricePoint> = points
            .into_iter()
            .filter(|p| wanted.contains(&p.instrument_code))
            .collect();
        if selected.is_empty() {
            return PriceView::Unavailable;
        }
        PriceView::from_read(read, selected)
    }

    fn history(&self, code: &InstrumentCode, days: u32) -> PriceView<Vec<PricePoint>> {
        let key = CacheKey::history(code.clone(), days);
        match self.read(&key).0 {
            Some(read) => match read.value.clone().into_points() {
                Some(points) => PriceView::from_read(read, points),
                None => PriceView::Unavailable,
            },
            None => PriceView::Unavailable,
        }
    }

    /// Buckets are aggregated from the cached history window when present,
    /// otherwise taken from the server-side stats.
    fn chart(
        &self,
        code: &InstrumentCode,
        period: Period,
        limit: u32,
    ) -> PriceView<Vec<ChartBucket>> {
        let history_key = CacheKey::history(code.clone(), self.config.history_days);
        let (history, history_refreshing) = self.read(&history_key);
        if let Some(read) = history {
            if let Some(points) = read.value.clone().into_points() {
                let mut buckets = ChartAggregator::aggregate(&points, period);
                let excess = buckets.len().saturating_sub(limit as usize);
                let recent = buckets.split_off(excess);
                return PriceView::from_read(read, recent);
            }
        }

        // A pending history fetch will serve the next chart read; only fall
        // back to fetching stats when no history is on its way.
        let stats_key = CacheKey::bucket_stats(code.clone(), period, limit);
        let stats = if history_refreshing {
            self.cache.get_or_backup(&stats_key)
        } else {
            self.read(&stats_key).0
        };
        match stats {
            Some(read) => match read.value.clone().into_buckets() {
                Some(buckets) => PriceView::from_read(read, buckets),
                None => PriceView::Unavailable,
            },
            None => PriceView::Unavailable,
        }
    }

    fn label_plan(
        &self,
        raw_labels: &[String],
        budget: &PixelBudget,
        period: Period,
    ) -> LabelPlan {
        LabelLayoutEngine::for_period(period).plan(raw_labels, budget)
    }

    async fn refresh_now(&self, key: &CacheKey) -> RefreshOutcome {
        self.refresher.refresh(key, CancelSignal::never()).await
    }
}
