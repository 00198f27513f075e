use std::sync::Arc;

use anyhow::Context;
use scrapmarket_core::cache::{
    BackupStore, BackupWriteMode, CacheStore, FileBackupStore, InMemoryBackupStore, PriceSnapshot,
};
use scrapmarket_core::clock::{Clock, SystemClock};
use scrapmarket_core::config::PriceSyncConfig;
use scrapmarket_core::prices::PriceService;
use scrapmarket_market_data::HttpPriceSource;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const USER_AGENT: &str = concat!("scrapmarket-price-daemon/", env!("CARGO_PKG_VERSION"));

pub fn init_tracing() {
    let log_format =
        std::env::var("SCRAPMARKET_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

fn build_backup(config: &PriceSyncConfig) -> anyhow::Result<Arc<dyn BackupStore>> {
    match &config.backup_dir {
        Some(dir) => {
            let store = FileBackupStore::open(dir)
                .with_context(|| format!("opening backup directory {}", dir.display()))?;
            tracing::info!("Price backup directory: {}", store.dir().display());
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!("No backup directory configured; backups kept in memory");
            Ok(Arc::new(InMemoryBackupStore::new()))
        }
    }
}

pub fn build_service(config: PriceSyncConfig) -> anyhow::Result<PriceService> {
    let client = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .user_agent(USER_AGENT)
        .build()
        .context("building HTTP client")?;
    let source = Arc::new(HttpPriceSource::new(
        client,
        config.api_base_url.clone(),
        config.api_key.clone(),
    ));
    tracing::info!("Price API: {}", source.base_url());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = CacheStore::<PriceSnapshot>::new(clock)
        .with_backup(build_backup(&config)?, BackupWriteMode::Background);

    let service = PriceService::new(config, source, Arc::new(cache))?;
    Ok(service)
}
