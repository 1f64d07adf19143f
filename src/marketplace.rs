//! Marketplace access: the client capability consumed by the scraper.

use std::collections::BTreeMap;
use std::collections::HashMap;

use async_trait::async_trait;

use crate::entity::RawListing;
use crate::marketplace::error::MarketplaceError;

pub mod error;
pub mod polovni_auto;

/// Query parameters for one crawl, keyed by marketplace parameter name.
///
/// Multi-valued parameters (`model[]`, `region[]`, `chassis[]`) carry comma-joined values.
pub type CrawlParams = BTreeMap<String, String>;

pub const PARAM_BRAND: &str = "brand";
pub const PARAM_MODEL: &str = "model[]";
pub const PARAM_REGION: &str = "region[]";
pub const PARAM_CHASSIS: &str = "chassis[]";
pub const PARAM_PRICE_FROM: &str = "price_from";
pub const PARAM_PRICE_TO: &str = "price_to";
pub const PARAM_YEAR_FROM: &str = "year_from";
pub const PARAM_YEAR_TO: &str = "year_to";
pub const PARAM_SHOW_OLD_NEW: &str = "showOldNew";
pub const PARAM_SORT: &str = "sort";
pub const PARAM_DATE_LIMIT: &str = "date_limit";

/// Paginated fetch-and-parse access to the marketplace.
#[async_trait]
pub trait MarketplaceClient: Send + Sync {
    /// Fetches every result page for the given parameters and returns the parsed listings.
    async fn fetch_listings(&self, params: &CrawlParams)
    -> Result<Vec<RawListing>, MarketplaceError>;

    /// Fetches the chassis taxonomy as display name to marketplace id.
    async fn fetch_chassis(&self) -> Result<HashMap<String, String>, MarketplaceError>;
}
