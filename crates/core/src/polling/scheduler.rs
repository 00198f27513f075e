use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use log::{debug, info, warn};
use scrapmarket_market_data::{CancelHandle, CancelSignal};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::interval::IntervalProvider;
use super::profile::RuntimeProfile;
use super::{PollState, RefreshOutcome, Refresher};
use crate::cache::CacheKey;

struct PollTask {
    stop: CancelHandle,
    state: watch::Receiver<PollState>,
    nudge: Arc<Notify>,
    handle: JoinHandle<()>,
}

/// Drives periodic refresh of cache keys, one Tokio task per key.
///
/// The scheduler only triggers refreshes; committing values is the
/// [`Refresher`]'s job. A key is never fetched twice concurrently by its own
/// loop, and a timer cannot fire while the key is fetching.
pub struct PollingScheduler {
    refresher: Arc<dyn Refresher>,
    profile: watch::Sender<RuntimeProfile>,
    tasks: Mutex<HashMap<CacheKey, PollTask>>,
}

impl PollingScheduler {
    pub fn new(refresher: Arc<dyn Refresher>, profile: RuntimeProfile) -> Self {
        let (profile, _rx) = watch::channel(profile);
        Self {
            refresher,
            profile,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<CacheKey, PollTask>> {
        self.tasks.lock().unwrap_or_else(|poisoned| {
            warn!("Polling task lock was poisoned. Recovering.");
            poisoned.into_inner()
        })
    }

    /// Start polling `key`, replacing any existing loop for it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, key: CacheKey, interval: Arc<dyn IntervalProvider>) {
        let profile = *self.profile.borrow();
        let initial = if next_interval(interval.as_ref(), &profile).is_some() {
            PollState::Scheduled
        } else {
            PollState::Suspended
        };

        let stop = CancelHandle::new();
        let nudge = Arc::new(Notify::new());
        let (state_tx, state_rx) = watch::channel(initial);

        let handle = tokio::spawn(run_poll_loop(
            key.clone(),
            interval,
            self.refresher.clone(),
            self.profile.subscribe(),
            state_tx,
            stop.signal(),
            nudge.clone(),
        ));

        info!("Started polling {} ({:?})", key, initial);
        let previous = self.tasks().insert(
            key,
            PollTask {
                stop,
                state: state_rx,
                nudge,
                handle,
            },
        );
        if let Some(previous) = previous {
            previous.stop.cancel();
        }
    }

    /// Stop polling `key`. A running fetch is cancelled before its next
    /// attempt; nothing partial is committed.
    pub fn stop(&self, key: &CacheKey) -> bool {
        match self.tasks().remove(key) {
            Some(task) => {
                task.stop.cancel();
                info!("Stopped polling {}", key);
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        let tasks: Vec<(CacheKey, PollTask)> = self.tasks().drain().collect();
        for (_, task) in &tasks {
            task.stop.cancel();
        }
        if !tasks.is_empty() {
            info!("Stopped polling {} keys", tasks.len());
        }
    }

    /// Stop everything and wait for the loops to exit.
    pub async fn shutdown(&self) {
        let tasks: Vec<(CacheKey, PollTask)> = self.tasks().drain().collect();
        for (_, task) in &tasks {
            task.stop.cancel();
        }
        for (key, task) in tasks {
            if let Err(e) = task.handle.await {
                warn!("Polling task for {} ended abnormally: {}", key, e);
            }
        }
    }

    /// Publish new host signals. Re-sending the current profile is a no-op
    /// and never disturbs a running timer.
    pub fn set_profile(&self, profile: RuntimeProfile) {
        self.profile.send_if_modified(|current| {
            if *current == profile {
                return false;
            }
            debug!("Runtime profile changed: {:?} -> {:?}", current, profile);
            *current = profile;
            true
        });
    }

    pub fn profile(&self) -> RuntimeProfile {
        *self.profile.borrow()
    }

    /// Current state; keys that are not polled are `Idle`.
    pub fn state(&self, key: &CacheKey) -> PollState {
        self.tasks()
            .get(key)
            .map(|task| *task.state.borrow())
            .unwrap_or(PollState::Idle)
    }

    pub fn watch_state(&self, key: &CacheKey) -> Option<watch::Receiver<PollState>> {
        self.tasks().get(key).map(|task| task.state.clone())
    }

    /// Fire `key`'s timer early. Only honoured while `Scheduled`, so an
    /// in-flight or suspended key is never fetched twice.
    pub fn request_refresh(&self, key: &CacheKey) -> bool {
        let tasks = self.tasks();
        match tasks.get(key) {
            Some(task) if *task.state.borrow() == PollState::Scheduled => {
                task.nudge.notify_one();
                true
            }
            _ => false,
        }
    }

    pub fn is_polling(&self, key: &CacheKey) -> bool {
        self.tasks().contains_key(key)
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self.tasks().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}

fn next_interval(
    interval: &dyn IntervalProvider,
    profile: &RuntimeProfile,
) -> Option<std::time::Duration> {
    if profile.allows_refresh() {
        interval.interval(profile)
    } else {
        None
    }
}

fn set_state(state: &watch::Sender<PollState>, key: &CacheKey, next: PollState) {
    let previous = state.send_replace(next);
    if previous != next {
        debug!("{}: {:?} -> {:?}", key, previous, next);
    }
}

async fn run_poll_loop(
    key: CacheKey,
    interval: Arc<dyn IntervalProvider>,
    refresher: Arc<dyn Refresher>,
    mut profile_rx: watch::Receiver<RuntimeProfile>,
    state: watch::Sender<PollState>,
    stop: CancelSignal,
    nudge: Arc<Notify>,
) {
    // Interval and deadline of the pending timer. Kept across profile
    // changes that leave the interval as it was.
    let mut timer: Option<(std::time::Duration, Instant)> = None;

    'poll: loop {
        if stop.is_cancelled() {
            break;
        }

        let profile = *profile_rx.borrow_and_update();
        let period = match next_interval(interval.as_ref(), &profile) {
            Some(period) => period,
            None => {
                timer = None;
                set_state(&state, &key, PollState::Suspended);
                tokio::select! {
                    _ = stop.cancelled() => break 'poll,
                    changed = profile_rx.changed() => {
                        if changed.is_err() {
                            break 'poll;
                        }
                    }
                }
                continue 'poll;
            }
        };

        let deadline = match timer {
            Some((current, deadline)) if current == period => deadline,
            _ => {
                let deadline = Instant::now() + period;
                timer = Some((period, deadline));
                deadline
            }
        };

        set_state(&state, &key, PollState::Scheduled);
        tokio::select! {
            _ = stop.cancelled() => break 'poll,
            changed = profile_rx.changed() => {
                if changed.is_err() {
                    break 'poll;
                }
                // Re-evaluate the interval under the new profile.
                continue 'poll;
            }
            _ = tokio::time::sleep_until(deadline) => {}
            _ = nudge.notified() => debug!("{}: refresh requested", key),
        }
        timer = None;

        set_state(&state, &key, PollState::Fetching);
        let fetch_cancel = CancelHandle::new();
        let mut fetch = refresher.refresh(&key, fetch_cancel.signal());
        let outcome = loop {
            tokio::select! {
                outcome = &mut fetch => break outcome,
                _ = stop.cancelled(), if !fetch_cancel.is_cancelled() => {
                    fetch_cancel.cancel();
                }
                changed = profile_rx.changed(), if !fetch_cancel.is_cancelled() => {
                    let allowed = changed.is_ok() && profile_rx.borrow().allows_refresh();
                    let suspended = !allowed;
                    if suspended {
                        debug!("{}: cancelling fetch after profile change", key);
                        fetch_cancel.cancel();
                    }
                }
            }
        };

        // A request that raced the timer or this fetch is already served.
        if nudge.notified().now_or_never().is_some() {
            debug!("{}: dropped refresh request made during fetch", key);
        }

        match &outcome {
            RefreshOutcome::Committed => debug!("{}: refreshed", key),
            RefreshOutcome::Discarded => debug!("{}: newer value already committed", key),
            RefreshOutcome::AlreadyInFlight => debug!("{}: fetch already in flight", key),
            RefreshOutcome::Failed(error) => {
                warn!("{}: refresh failed ({}), keeping previous value", key, error)
            }
        }
    }

    set_state(&state, &key, PollState::Idle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polling::{AdaptiveInterval, PowerMode};
    use async_trait::async_trait;
    use scrapmarket_market_data::ClassifiedError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct MockRefresher {
        calls: AtomicU32,
        cancelled: AtomicU32,
        hold: Option<Duration>,
        wait_for_cancel: bool,
    }

    #[async_trait]
    impl Refresher for MockRefresher {
        async fn refresh(&self, _key: &CacheKey, cancel: CancelSignal) -> RefreshOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.wait_for_cancel {
                cancel.cancelled().await;
                self.cancelled.fetch_add(1, Ordering::SeqCst);
                return RefreshOutcome::Failed(ClassifiedError::cancelled());
            }
            if let Some(hold) = self.hold {
                tokio::time::sleep(hold).await;
            }
            RefreshOutcome::Committed
        }
    }

    fn every_minute() -> Arc<dyn IntervalProvider> {
        Arc::new(AdaptiveInterval::new(Duration::from_secs(60)).with_low_power_multiplier(5))
    }

    async fn wait_for(scheduler: &PollingScheduler, key: &CacheKey, expected: PollState) {
        let mut rx = scheduler.watch_state(key).unwrap();
        tokio::time::timeout(Duration::from_secs(3600), rx.wait_for(|s| *s == expected))
            .await
            .expect("state not reached")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_schedules_and_fetches_on_timer() {
        let refresher = Arc::new(MockRefresher::default());
        let scheduler = PollingScheduler::new(refresher.clone(), RuntimeProfile::foreground());
        scheduler.start(CacheKey::Latest, every_minute());
        assert_eq!(scheduler.state(&CacheKey::Latest), PollState::Scheduled);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_key_is_idle() {
        let scheduler =
            PollingScheduler::new(Arc::new(MockRefresher::default()), RuntimeProfile::foreground());
        assert_eq!(scheduler.state(&CacheKey::Latest), PollState::Idle);
        assert!(!scheduler.request_refresh(&CacheKey::Latest));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_while_fetching_is_noop() {
        let refresher = Arc::new(MockRefresher {
            hold: Some(Duration::from_secs(150)),
            ..MockRefresher::default()
        });
        let scheduler = PollingScheduler::new(refresher.clone(), RuntimeProfile::foreground());
        scheduler.start(CacheKey::Latest, every_minute());

        tokio::time::sleep(Duration::from_secs(200)).await;
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.state(&CacheKey::Latest), PollState::Fetching);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_suspends_and_resume_reschedules() {
        let refresher = Arc::new(MockRefresher::default());
        let scheduler = PollingScheduler::new(refresher.clone(), RuntimeProfile::background());
        scheduler.start(CacheKey::Latest, every_minute());
        assert_eq!(scheduler.state(&CacheKey::Latest), PollState::Suspended);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);

        scheduler.set_profile(RuntimeProfile::foreground());
        wait_for(&scheduler, &CacheKey::Latest, PollState::Scheduled).await;

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_power_stretches_polling() {
        let refresher = Arc::new(MockRefresher::default());
        let profile = RuntimeProfile::foreground().with_power(PowerMode::LowPower);
        let scheduler = PollingScheduler::new(refresher.clone(), profile);
        scheduler.start(CacheKey::Latest, every_minute());

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_during_fetch_cancels_it() {
        let refresher = Arc::new(MockRefresher {
            wait_for_cancel: true,
            ..MockRefresher::default()
        });
        let scheduler = PollingScheduler::new(refresher.clone(), RuntimeProfile::foreground());
        scheduler.start(CacheKey::Latest, every_minute());
        wait_for(&scheduler, &CacheKey::Latest, PollState::Fetching).await;

        scheduler.set_profile(RuntimeProfile::background());
        wait_for(&scheduler, &CacheKey::Latest, PollState::Suspended).await;
        assert_eq!(refresher.cancelled.load(Ordering::SeqCst), 1);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_inflight_fetch() {
        let refresher = Arc::new(MockRefresher {
            wait_for_cancel: true,
            ..MockRefresher::default()
        });
        let scheduler = PollingScheduler::new(refresher.clone(), RuntimeProfile::foreground());
        scheduler.start(CacheKey::Latest, every_minute());
        wait_for(&scheduler, &CacheKey::Latest, PollState::Fetching).await;

        scheduler.shutdown().await;
        assert_eq!(refresher.cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.state(&CacheKey::Latest), PollState::Idle);
        assert!(scheduler.keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_refresh_fires_early() {
        let refresher = Arc::new(MockRefresher::default());
        let scheduler = PollingScheduler::new(refresher.clone(), RuntimeProfile::foreground());
        scheduler.start(CacheKey::Latest, every_minute());
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(scheduler.request_refresh(&CacheKey::Latest));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_resending_current_profile_keeps_polling() {
        let refresher = Arc::new(MockRefresher::default());
        let scheduler = PollingScheduler::new(refresher.clone(), RuntimeProfile::foreground());
        scheduler.start(CacheKey::Latest, every_minute());

        for _ in 0..20 {
            tokio::time::sleep(Duration::from_secs(30)).await;
            scheduler.set_profile(RuntimeProfile::foreground());
        }
        assert!(refresher.calls.load(Ordering::SeqCst) >= 9);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_profile_change_with_same_interval_keeps_deadline() {
        let refresher = Arc::new(MockRefresher::default());
        let scheduler = PollingScheduler::new(refresher.clone(), RuntimeProfile::foreground());
        scheduler.start(CacheKey::Latest, every_minute());

        let mut background_refresh = false;
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_secs(30)).await;
            background_refresh = !background_refresh;
            scheduler.set_profile(
                RuntimeProfile::foreground().with_background_refresh(background_refresh),
            );
        }
        assert!(refresher.calls.load(Ordering::SeqCst) >= 9);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_request_during_fetch_is_dropped() {
        let refresher = Arc::new(MockRefresher {
            hold: Some(Duration::from_secs(10)),
            ..MockRefresher::default()
        });
        let scheduler = PollingScheduler::new(refresher.clone(), RuntimeProfile::foreground());
        scheduler.start(CacheKey::Latest, every_minute());
        wait_for(&scheduler, &CacheKey::Latest, PollState::Fetching).await;

        // Same effect as a request that saw `Scheduled` just before the timer fired.
        scheduler
            .tasks()
            .get(&CacheKey::Latest)
            .unwrap()
            .nudge
            .notify_one();

        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.state(&CacheKey::Latest), PollState::Scheduled);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_removes_key() {
        let scheduler =
            PollingScheduler::new(Arc::new(MockRefresher::default()), RuntimeProfile::foreground());
        scheduler.start(CacheKey::Latest, every_minute());
        assert!(scheduler.is_polling(&CacheKey::Latest));

        assert!(scheduler.stop(&CacheKey::Latest));
        assert!(!scheduler.stop(&CacheKey::Latest));
        assert_eq!(scheduler.state(&CacheKey::Latest), PollState::Idle);
    }
}
