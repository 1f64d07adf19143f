//! Common test utilities and fake collaborators.

use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use auto_alert::delivery::DeliveryChannel;
use auto_alert::delivery::DeliveryError;
use auto_alert::entity::Listing;
use auto_alert::entity::RawListing;
use auto_alert::entity::Subscription;
use auto_alert::entity::SubscriptionBuilder;
use auto_alert::entity::UserId;
use auto_alert::marketplace::CrawlParams;
use auto_alert::marketplace::MarketplaceClient;
use auto_alert::marketplace::PARAM_BRAND;
use auto_alert::marketplace::error::MarketplaceError;
use auto_alert::repository::sqlite::SqliteRepository;
use uuid::Uuid;

/// Sets up a migrated database in a temporary file.
#[allow(dead_code)]
pub async fn setup_db() -> (Arc<SqliteRepository>, PathBuf) {
    let db_path = std::env::temp_dir().join(format!("auto-alert-test-{}.db", Uuid::new_v4()));
    let db_url = format!("sqlite://{}", db_path.to_string_lossy());

    let repository = SqliteRepository::new(&db_url, &db_path.to_string_lossy())
        .await
        .expect("Failed to create database");
    repository
        .run_migrations()
        .await
        .expect("Failed to run migrations");

    (Arc::new(repository), db_path)
}

/// Removes the test database together with its WAL files.
#[allow(dead_code)]
pub async fn teardown_db(db_path: PathBuf) {
    for suffix in ["", "-wal", "-shm"] {
        let path = PathBuf::from(format!("{}{}", db_path.to_string_lossy(), suffix));
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[allow(dead_code)]
pub async fn stored_listing(
    repository: &SqliteRepository,
    subscription_id: &str,
    listing_id: &str,
) -> Listing {
    repository
        .listing
        .select(subscription_id, listing_id)
        .await
        .expect("Failed to load listing")
        .unwrap_or_else(|| panic!("Listing {listing_id} missing"))
}

#[allow(dead_code)]
pub fn subscription(user_id: UserId, brand: &str) -> Subscription {
    SubscriptionBuilder::default()
        .user_id(user_id)
        .brand(brand)
        .build()
        .expect("Failed to build subscription")
}

#[allow(dead_code)]
pub fn raw_listing(id: &str, price: &str) -> RawListing {
    RawListing {
        id: id.to_string(),
        title: format!("Listing {id}"),
        price: price.to_string(),
        year: "2015".to_string(),
        link: format!("https://marketplace.test/auto-oglasi/{id}"),
        ..Default::default()
    }
}

// FAKE MARKETPLACE

#[derive(Default)]
#[allow(dead_code)]
pub struct FakeMarketplaceState {
    /// Listings returned per `brand` parameter.
    pub listings: HashMap<String, Vec<RawListing>>,
    pub failing_brands: HashSet<String>,
    pub panicking_brands: HashSet<String>,
    pub chassis: HashMap<String, String>,
    pub requests: Vec<CrawlParams>,
    pub delay: Duration,
}

#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct FakeMarketplace {
    pub state: Arc<RwLock<FakeMarketplaceState>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl FakeMarketplace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_listings(&self, brand: &str, listings: Vec<RawListing>) {
        self.state
            .write()
            .unwrap()
            .listings
            .insert(brand.to_string(), listings);
    }

    pub fn fail_brand(&self, brand: &str) {
        self.state
            .write()
            .unwrap()
            .failing_brands
            .insert(brand.to_string());
    }

    pub fn panic_on_brand(&self, brand: &str) {
        self.state
            .write()
            .unwrap()
            .panicking_brands
            .insert(brand.to_string());
    }

    pub fn set_chassis(&self, chassis: HashMap<String, String>) {
        self.state.write().unwrap().chassis = chassis;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.write().unwrap().delay = delay;
    }

    pub fn requests(&self) -> Vec<CrawlParams> {
        self.state.read().unwrap().requests.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketplaceClient for FakeMarketplace {
    async fn fetch_listings(
        &self,
        params: &CrawlParams,
    ) -> Result<Vec<RawListing>, MarketplaceError> {
        let brand = params.get(PARAM_BRAND).cloned().unwrap_or_default();
        let (delay, panics, fails, listings) = {
            let mut state = self.state.write().unwrap();
            state.requests.push(params.clone());
            (
                state.delay,
                state.panicking_brands.contains(&brand),
                state.failing_brands.contains(&brand),
                state.listings.get(&brand).cloned().unwrap_or_default(),
            )
        };

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if panics {
            panic!("marketplace fake panicked for {brand}");
        }
        if fails {
            return Err(MarketplaceError::UnexpectedStatus {
                status: 503,
                url: format!("https://marketplace.test/?brand={brand}"),
            });
        }
        Ok(listings)
    }

    async fn fetch_chassis(&self) -> Result<HashMap<String, String>, MarketplaceError> {
        Ok(self.state.read().unwrap().chassis.clone())
    }
}

// FAKE DELIVERY CHANNEL

#[derive(Default)]
#[allow(dead_code)]
pub struct FakeChannelState {
    /// Outcomes consumed per user; an empty script means success.
    pub scripts: HashMap<UserId, VecDeque<Result<(), DeliveryError>>>,
    pub sent: Vec<(UserId, String)>,
    pub attempts: usize,
}

#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct FakeChannel {
    pub state: Arc<RwLock<FakeChannelState>>,
}

#[allow(dead_code)]
impl FakeChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, user_id: UserId, outcome: Result<(), DeliveryError>) {
        self.state
            .write()
            .unwrap()
            .scripts
            .entry(user_id)
            .or_default()
            .push_back(outcome);
    }

    pub fn always_gone(&self, user_id: UserId, times: usize) {
        for _ in 0..times {
            self.script(user_id, Err(DeliveryError::RecipientGone { user_id }));
        }
    }

    pub fn sent(&self) -> Vec<(UserId, String)> {
        self.state.read().unwrap().sent.clone()
    }

    pub fn attempts(&self) -> usize {
        self.state.read().unwrap().attempts
    }
}

#[async_trait]
impl DeliveryChannel for FakeChannel {
    async fn send(&self, user_id: UserId, message: &str) -> Result<(), DeliveryError> {
        let mut state = self.state.write().unwrap();
        state.attempts += 1;
        let outcome = state
            .scripts
            .get_mut(&user_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(()));
        if outcome.is_ok() {
            state.sent.push((user_id, message.to_string()));
        }
        outcome
    }
}
