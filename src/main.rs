//! Application entry point for auto-alert.
//!
//! Initializes all components and runs the scrape and dispatch loops until Ctrl+C.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use anyhow::Result;
use auto_alert::config::Config;
use auto_alert::delivery::telegram::TelegramChannel;
use auto_alert::logging::setup_logging;
use auto_alert::marketplace::polovni_auto::PolovniAutoClient;
use auto_alert::repository::sqlite::SqliteRepository;
use auto_alert::service::Services;
use auto_alert::task::PeriodicTask;
use auto_alert::task::dispatch_job::DispatchJob;
use auto_alert::task::scrape_job::ScrapeJob;
use auto_alert::task::taxonomy_refresh_job::TaxonomyRefreshJob;
use dotenv::dotenv;
use log::debug;
use log::error;
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let init_start = Instant::now();
    let config = Config::from_env()?;
    let _log_guard = setup_logging(&config)?;
    info!("Starting auto-alert...");

    let services = setup_services(&config, init_start).await?;

    // Unresolved chassis filters would silently broaden every search.
    let chassis = services
        .taxonomy
        .refresh()
        .await
        .context("Initial chassis taxonomy refresh failed")?;
    info!("Loaded {} chassis types.", chassis);

    let shutdown = CancellationToken::new();
    let handles = setup_tasks(&config, &services, &shutdown);

    run(init_start, shutdown, handles).await
}

async fn setup_services(config: &Config, init_start: Instant) -> Result<Services> {
    debug!("Setting up repository...");
    let repository = SqliteRepository::new(&config.db_url, &config.db_path).await?;
    repository.run_migrations().await?;
    let repository = Arc::new(repository);

    debug!("Setting up marketplace client and delivery channel...");
    let client = Arc::new(PolovniAutoClient::new(
        &config.marketplace_url,
        config.page_limit,
        config.page_delay,
        config.page_jitter,
    )?);
    let channel = Arc::new(TelegramChannel::new(
        &config.telegram_api_url,
        &config.telegram_token,
    )?);

    let services = Services::new(repository, client, channel, config.scrape_workers)?;
    info!(
        "Services setup complete ({:.2}s).",
        init_start.elapsed().as_secs_f64()
    );
    Ok(services)
}

fn setup_tasks(
    config: &Config,
    services: &Services,
    shutdown: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let tasks = [
        PeriodicTask::new(
            Arc::new(ScrapeJob::new(services.scrape.clone())),
            config.scrape_interval,
            config.scrape_start_offset,
            shutdown,
        ),
        PeriodicTask::new(
            Arc::new(DispatchJob::new(services.notification.clone())),
            config.dispatch_interval,
            std::time::Duration::ZERO,
            shutdown,
        ),
        // Startup already refreshed, so the first periodic refresh waits a full interval.
        PeriodicTask::new(
            Arc::new(TaxonomyRefreshJob::new(services.taxonomy.clone())),
            config.taxonomy_refresh_interval,
            config.taxonomy_refresh_interval,
            shutdown,
        ),
    ];

    tasks.into_iter().filter_map(PeriodicTask::start).collect()
}

async fn run(
    init_start: Instant,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
) -> Result<()> {
    info!(
        "auto-alert is up in {:.2}s. Press Ctrl+C to stop.",
        init_start.elapsed().as_secs_f64()
    );

    tokio::signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down.");
    shutdown.cancel();

    for handle in handles {
        if let Err(e) = handle.await {
            error!("Background task ended abnormally: {}", e);
        }
    }
    info!("Shutdown complete.");

    Ok(())
}
