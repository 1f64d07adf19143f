//! Periodic scrape cycle.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::service::scrape_service::ScrapeMode;
use crate::service::scrape_service::ScrapeService;
use crate::task::PeriodicJob;

/// Runs a full-catalogue cycle on the first tick and last-24h cycles afterwards.
pub struct ScrapeJob {
    service: Arc<ScrapeService>,
}

impl ScrapeJob {
    pub fn new(service: Arc<ScrapeService>) -> Self {
        Self { service }
    }

    pub fn mode_for_tick(tick: u64) -> ScrapeMode {
        if tick == 0 {
            ScrapeMode::All
        } else {
            ScrapeMode::NewOnly
        }
    }
}

#[async_trait]
impl PeriodicJob for ScrapeJob {
    fn name(&self) -> &'static str {
        "ScrapeJob"
    }

    async fn run_once(&self, tick: u64, cancel: &CancellationToken) -> anyhow::Result<()> {
        self.service
            .run_cycle(cancel, Self::mode_for_tick(tick))
            .await?;
        Ok(())
    }
}
