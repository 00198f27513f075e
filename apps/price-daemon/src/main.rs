mod main_lib;
mod report;

use std::sync::Arc;
use std::time::Duration;

use main_lib::{build_service, init_tracing};
use scrapmarket_core::config::PriceSyncConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Ignoring unreadable .env file: {}", e);
        }
    }
    init_tracing();

    let config = PriceSyncConfig::from_env()?;
    let summary_every = Duration::from_secs(config.poll.foreground_secs);
    tracing::info!(
        "Tracking {} instruments, {} days of history",
        config.instruments.len(),
        config.history_days
    );

    let service = Arc::new(build_service(config)?);

    let warmed = service.warm_up().await;
    let failed = warmed.iter().filter(|(_, o)| !o.is_success()).count();
    tracing::info!("Warm-up done: {} keys, {} failed", warmed.len(), failed);

    service.start_polling();
    report::start_summary_reporter(service.clone(), summary_every);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down price polling");
    service.shutdown().await;
    Ok(())
}
