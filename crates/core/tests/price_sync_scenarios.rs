//! End-to-end scenarios: polling, retry, cache and backup wired through
//! `PriceService` against a scripted price source.
//!
//! Tokio time is paused so polling intervals and backoff run instantly; cache
//! freshness follows a `ManualClock` that only moves when a test says so.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use scrapmarket_core::cache::{
    BackupStore, BackupWriteMode, CacheKey, CacheStore, FileBackupStore, PriceSnapshot, ReadOrigin,
};
use scrapmarket_core::clock::{Clock, ManualClock};
use scrapmarket_core::config::{PollConfig, PriceSyncConfig, RetryConfig};
use scrapmarket_core::polling::PollState;
use scrapmarket_core::prices::{PriceService, PriceServiceTrait, PriceView};
use scrapmarket_market_data::{
    ChartBucket, ErrorKind, FetchError, InstrumentCode, Period, PricePoint, RemoteDataSource,
};

// =============================================================================
// Scripted source
// =============================================================================

/// Replays queued responses per endpoint; an exhausted queue answers 404.
#[derive(Default)]
struct ScriptedSource {
    latest: Mutex<VecDeque<Result<Vec<PricePoint>, FetchError>>>,
    history: Mutex<VecDeque<Result<Vec<PricePoint>, FetchError>>>,
    latest_calls: AtomicU32,
    history_calls: AtomicU32,
    /// Answer every latest request with this error instead of the queue.
    latest_failure: Option<FetchError>,
}

impl ScriptedSource {
    fn push_latest(&self, points: Vec<PricePoint>) {
        self.latest.lock().unwrap().push_back(Ok(points));
    }

    fn push_history(&self, points: Vec<PricePoint>) {
        self.history.lock().unwrap().push_back(Ok(points));
    }

    fn latest_calls(&self) -> u32 {
        self.latest_calls.load(Ordering::SeqCst)
    }
}

fn not_scripted<T>() -> Result<Vec<T>, FetchError> {
    Err(FetchError::status(404, "not scripted"))
}

#[async_trait]
impl RemoteDataSource for ScriptedSource {
    fn id(&self) -> &'static str {
        "SCRIPTED"
    }

    async fn fetch_latest(
        &self,
        _codes: &BTreeSet<InstrumentCode>,
    ) -> Result<Vec<PricePoint>, FetchError> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.latest_failure {
            return Err(error.clone());
        }
        self.latest
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(not_scripted)
    }

    async fn fetch_history(
        &self,
        _code: &InstrumentCode,
        _days: u32,
    ) -> Result<Vec<PricePoint>, FetchError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.history
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(not_scripted)
    }

    async fn fetch_bucket_stats(
        &self,
        _code: &InstrumentCode,
        _period: Period,
        _limit: u32,
    ) -> Result<Vec<ChartBucket>, FetchError> {
        not_scripted()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn copper() -> InstrumentCode {
    InstrumentCode::parse("CU").unwrap()
}

fn copper_at(day: u32, price: Decimal) -> PricePoint {
    PricePoint::new(
        copper(),
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
        price,
        None,
        None,
    )
    .unwrap()
}

fn config() -> PriceSyncConfig {
    PriceSyncConfig {
        instruments: vec![copper()],
        history_days: 30,
        poll: PollConfig {
            foreground_secs: 60,
            ..PollConfig::default()
        },
        ..PriceSyncConfig::default()
    }
}

fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap(),
    ))
}

fn build(
    config: PriceSyncConfig,
    source: Arc<ScriptedSource>,
    clock: Arc<ManualClock>,
    backup: Option<Arc<dyn BackupStore>>,
) -> PriceService {
    let clock: Arc<dyn Clock> = clock;
    let mut cache = CacheStore::<PriceSnapshot>::new(clock);
    if let Some(backup) = backup {
        cache = cache.with_backup(backup, BackupWriteMode::Inline);
    }
    PriceService::new(config, source, Arc::new(cache)).unwrap()
}

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_polling_fills_cache_and_survives_failures() {
    let source = Arc::new(ScriptedSource::default());
    source.push_latest(vec![copper_at(15, dec!(9120))]);
    source.push_history(vec![copper_at(14, dec!(9000)), copper_at(15, dec!(9120))]);
    let service = build(config(), source.clone(), manual_clock(), None);

    service.start_polling();
    assert_eq!(service.poll_state(&CacheKey::Latest), PollState::Scheduled);
    advance(61).await;

    assert_eq!(source.latest_calls(), 1);
    assert!(service.latest(&[]).is_fresh());
    assert_eq!(service.history(&copper(), 30).value().map(Vec::len), Some(2));

    // The next poll hits an unscripted 404; the committed value stays.
    advance(60).await;
    assert_eq!(source.latest_calls(), 2);
    assert_eq!(
        service.last_error(&CacheKey::Latest).map(|e| e.kind),
        Some(ErrorKind::NotFound)
    );
    assert_eq!(
        service.latest(&[]).value().map(|p| p[0].price),
        Some(dec!(9120))
    );

    // Failures reschedule at the normal interval.
    advance(60).await;
    assert_eq!(source.latest_calls(), 3);

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_stale_read_nudges_polling_loop() {
    let source = Arc::new(ScriptedSource::default());
    source.push_latest(vec![copper_at(15, dec!(9120))]);
    source.push_latest(vec![copper_at(15, dec!(9155))]);
    let clock = manual_clock();
    let mut config = config();
    config.poll.foreground_secs = 3600;
    let service = build(config, source.clone(), clock.clone(), None);

    service.refresh_now(&CacheKey::Latest).await;
    service.start_polling();
    clock.advance(chrono::Duration::seconds(301));

    let stale = service.latest(&[]);
    assert!(stale.is_stale());
    assert_eq!(stale.value().unwrap()[0].price, dec!(9120));

    advance(1).await;
    assert_eq!(source.latest_calls(), 2);
    let fresh = service.latest(&[]);
    assert!(fresh.is_fresh());
    assert_eq!(fresh.value().unwrap()[0].price, dec!(9155));

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_retry_backoff() {
    let source = Arc::new(ScriptedSource {
        latest_failure: Some(FetchError::Timeout),
        ..ScriptedSource::default()
    });
    let config = PriceSyncConfig {
        retry: RetryConfig {
            max_attempts: 5,
            base_delay_ms: 10_000,
            max_delay_ms: 60_000,
            jitter: false,
        },
        ..config()
    };
    let service = build(config, source.clone(), manual_clock(), None);

    service.start_polling();
    advance(61).await;
    assert_eq!(source.latest_calls(), 1);
    assert_eq!(service.poll_state(&CacheKey::Latest), PollState::Fetching);

    service.shutdown().await;
    advance(120).await;

    assert_eq!(source.latest_calls(), 1);
    assert_eq!(service.poll_state(&CacheKey::Latest), PollState::Idle);
    assert!(service.last_error(&CacheKey::Latest).is_none());
    assert_eq!(service.latest(&[]), PriceView::Unavailable);
}

#[tokio::test]
async fn test_file_backup_serves_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let backup: Arc<dyn BackupStore> = Arc::new(FileBackupStore::open(dir.path()).unwrap());
    let source = Arc::new(ScriptedSource::default());
    source.push_latest(vec![copper_at(15, dec!(9120))]);

    let first = build(config(), source.clone(), manual_clock(), Some(backup.clone()));
    first.refresh_now(&CacheKey::Latest).await;
    drop(first);
    assert!(dir.path().join("latest.json").exists());

    let restarted = build(config(), source, manual_clock(), Some(backup));
    match restarted.latest(&[copper()]) {
        PriceView::Stale { value, origin, .. } => {
            assert_eq!(origin, ReadOrigin::Backup);
            assert_eq!(value[0].price, dec!(9120));
        }
        other => panic!("expected stale backup value, got {:?}", other),
    }
}
