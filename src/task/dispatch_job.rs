//! Periodic notification dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::service::notification_service::NotificationService;
use crate::task::PeriodicJob;

pub struct DispatchJob {
    service: Arc<NotificationService>,
}

impl DispatchJob {
    pub fn new(service: Arc<NotificationService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl PeriodicJob for DispatchJob {
    fn name(&self) -> &'static str {
        "DispatchJob"
    }

    async fn run_once(&self, _tick: u64, cancel: &CancellationToken) -> anyhow::Result<()> {
        self.service.process_pending(cancel).await?;
        Ok(())
    }
}
