//! Periodic price summary in the log.

use std::sync::Arc;

use scrapmarket_core::cache::CacheKey;
use scrapmarket_core::prices::{PriceService, PriceServiceTrait, PriceView};
use scrapmarket_market_data::Period;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Starts logging a summary of the latest prices every `every`.
pub fn start_summary_reporter(service: Arc<PriceService>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick is immediate; give the warm-up a full period.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            log_summary(&service);
            log_weekly_trend(&service);
            let dropped = service.cache().clear_expired();
            if dropped > 0 {
                debug!("Dropped {} expired cache entries", dropped);
            }
        }
    });
}

fn log_summary(service: &PriceService) {
    match service.latest(&[]) {
        PriceView::Fresh { value, fetched_at } => {
            info!("{} prices, fetched at {}", value.len(), fetched_at);
            for point in &value {
                info!(
                    "  {:<22} {:>12} {:?}",
                    point.instrument_code.display_name(),
                    point.price.to_string(),
                    point.change_type
                );
            }
        }
        PriceView::Stale {
            value,
            fetched_at,
            origin,
        } => {
            warn!(
                "{} stale prices from {:?}, fetched at {}",
                value.len(),
                origin,
                fetched_at
            );
        }
        PriceView::Unavailable => {
            let reason = service
                .last_error(&CacheKey::Latest)
                .map(|e| e.user_message)
                .unwrap_or_else(|| "no data yet".to_string());
            warn!("Latest prices unavailable: {}", reason);
        }
    }
}

/// Latest weekly change per instrument, from the cached history.
fn log_weekly_trend(service: &PriceService) {
    let limit = service.config().bucket_limit;
    for code in service.tracked() {
        let Some(buckets) = service.chart(code, Period::Weekly, limit).into_value() else {
            continue;
        };
        if let Some(last) = buckets.last() {
            info!(
                "  {} week of {}: avg {} ({}%, {} samples)",
                code.display_name(),
                last.label,
                last.avg_price,
                last.change_percent,
                last.sample_count
            );
        }
    }
}
