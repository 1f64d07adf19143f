//! Scrape, dispatch and taxonomy services.

use std::sync::Arc;

use crate::cache::TaxonomyCache;
use crate::delivery::DeliveryChannel;
use crate::marketplace::MarketplaceClient;
use crate::repository::Repository;
use crate::service::error::ServiceError;
use crate::service::notification_service::NotificationService;
use crate::service::scrape_service::ScrapeService;
use crate::service::taxonomy_service::TaxonomyService;

pub mod change_detection;
pub mod error;
pub mod notification_service;
pub mod scrape_service;
pub mod taxonomy_service;

/// Container for all application services.
pub struct Services {
    pub scrape: Arc<ScrapeService>,
    pub notification: Arc<NotificationService>,
    pub taxonomy: Arc<TaxonomyService>,
}

impl Services {
    /// Creates all services over the shared collaborators.
    pub fn new(
        repository: Arc<dyn Repository>,
        client: Arc<dyn MarketplaceClient>,
        channel: Arc<dyn DeliveryChannel>,
        scrape_workers: usize,
    ) -> Result<Self, ServiceError> {
        let taxonomy = Arc::new(TaxonomyCache::new());

        Ok(Self {
            scrape: Arc::new(ScrapeService::new(
                repository.clone(),
                client.clone(),
                taxonomy.clone(),
                scrape_workers,
            )),
            notification: Arc::new(NotificationService::new(repository, channel)?),
            taxonomy: Arc::new(TaxonomyService::new(client, taxonomy)),
        })
    }
}
