//! Keeps the chassis taxonomy cache in sync with the marketplace.

use std::sync::Arc;

use log::info;
use log::warn;

use crate::cache::TaxonomyCache;
use crate::marketplace::MarketplaceClient;
use crate::service::error::ServiceError;

pub struct TaxonomyService {
    client: Arc<dyn MarketplaceClient>,
    taxonomy: Arc<TaxonomyCache>,
}

impl TaxonomyService {
    pub fn new(client: Arc<dyn MarketplaceClient>, taxonomy: Arc<TaxonomyCache>) -> Self {
        Self { client, taxonomy }
    }

    pub fn taxonomy(&self) -> Arc<TaxonomyCache> {
        self.taxonomy.clone()
    }

    /// Fetches the chassis list and swaps it into the cache.
    ///
    /// An empty result keeps the previous map. Returns the number of chassis now cached.
    pub async fn refresh(&self) -> Result<usize, ServiceError> {
        let chassis = self.client.fetch_chassis().await?;
        if chassis.is_empty() {
            warn!("Marketplace returned no chassis types. Keeping the cached list.");
            return Ok(self.taxonomy.chassis.len());
        }

        let count = chassis.len();
        self.taxonomy.chassis.replace(chassis);
        info!("Refreshed chassis taxonomy ({} entries).", count);
        Ok(count)
    }
}
