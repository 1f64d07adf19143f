//! Periodic chassis taxonomy refresh.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::service::taxonomy_service::TaxonomyService;
use crate::task::PeriodicJob;

pub struct TaxonomyRefreshJob {
    service: Arc<TaxonomyService>,
}

impl TaxonomyRefreshJob {
    pub fn new(service: Arc<TaxonomyService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl PeriodicJob for TaxonomyRefreshJob {
    fn name(&self) -> &'static str {
        "TaxonomyRefreshJob"
    }

    async fn run_once(&self, _tick: u64, _cancel: &CancellationToken) -> anyhow::Result<()> {
        self.service.refresh().await?;
        Ok(())
    }
}
