//! Fans subscriptions across a bounded worker pool, diffing and persisting each one.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use log::debug;
use log::error;
use log::info;
use log::warn;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::cache::TaxonomyCache;
use crate::entity::Subscription;
use crate::error::panic_message;
use crate::marketplace::CrawlParams;
use crate::marketplace::MarketplaceClient;
use crate::marketplace::PARAM_BRAND;
use crate::marketplace::PARAM_CHASSIS;
use crate::marketplace::PARAM_DATE_LIMIT;
use crate::marketplace::PARAM_MODEL;
use crate::marketplace::PARAM_PRICE_FROM;
use crate::marketplace::PARAM_PRICE_TO;
use crate::marketplace::PARAM_REGION;
use crate::marketplace::PARAM_SHOW_OLD_NEW;
use crate::marketplace::PARAM_SORT;
use crate::marketplace::PARAM_YEAR_FROM;
use crate::marketplace::PARAM_YEAR_TO;
use crate::repository::Repository;
use crate::service::change_detection::ChangeDetector;
use crate::service::change_detection::ChangeKind;
use crate::service::change_detection::DiffMode;
use crate::service::error::ScrapeError;
use crate::service::error::SubscriptionFailure;
use crate::service::error::SyncError;

/// Sort order putting the most recently renewed listings first.
const SORT_NEWEST: &str = "renewDate_desc";
/// Lookback of one day.
const DATE_LIMIT_ONE_DAY: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeMode {
    /// Full catalogue crawl. Unknown listings are recorded without notification.
    All,
    /// Listings renewed during the last 24 hours, newest first.
    NewOnly,
}

/// Outcome counters for one subscription sync.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    pub baseline: usize,
    pub new_listings: usize,
    pub price_changes: usize,
}

impl SyncStats {
    fn record(&mut self, kind: ChangeKind) {
        match kind {
            ChangeKind::Baseline => self.baseline += 1,
            ChangeKind::New => self.new_listings += 1,
            ChangeKind::PriceChanged => self.price_changes += 1,
        }
    }

    fn merge(&mut self, other: SyncStats) {
        self.baseline += other.baseline;
        self.new_listings += other.new_listings;
        self.price_changes += other.price_changes;
    }
}

/// Outcome of a successful scrape cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub total: usize,
    pub synced: usize,
    /// Subscriptions left unprocessed because the cycle was cancelled.
    pub skipped: usize,
    pub stats: SyncStats,
}

#[derive(Default)]
struct WorkerReport {
    synced: usize,
    stats: SyncStats,
    failures: Vec<SubscriptionFailure>,
}

type SubscriptionQueue = Arc<Mutex<mpsc::UnboundedReceiver<Subscription>>>;

/// Scrape orchestrator.
#[derive(Clone)]
pub struct ScrapeService {
    repository: Arc<dyn Repository>,
    client: Arc<dyn MarketplaceClient>,
    taxonomy: Arc<TaxonomyCache>,
    detector: ChangeDetector,
    workers: usize,
}

impl ScrapeService {
    pub fn new(
        repository: Arc<dyn Repository>,
        client: Arc<dyn MarketplaceClient>,
        taxonomy: Arc<TaxonomyCache>,
        workers: usize,
    ) -> Self {
        info!("Initializing ScrapeService with {} workers.", workers);
        Self {
            repository,
            client,
            taxonomy,
            detector: ChangeDetector::new(),
            workers: workers.max(1),
        }
    }

    /// Runs one scrape cycle over every subscription.
    ///
    /// Subscription failures never cancel each other; they are joined into
    /// [`ScrapeError::SubscriptionsFailed`] once the pool has drained. Cancellation stops
    /// workers from taking new subscriptions while in-flight ones finish.
    pub async fn run_cycle(
        &self,
        cancel: &CancellationToken,
        mode: ScrapeMode,
    ) -> Result<CycleSummary, ScrapeError> {
        let subscriptions = self.repository.list_subscriptions().await?;
        let total = subscriptions.len();
        if total == 0 {
            info!("No subscriptions found.");
            return Ok(CycleSummary::default());
        }
        info!("Scraping {} subscriptions in {:?} mode.", total, mode);

        let (tx, rx) = mpsc::unbounded_channel();
        for subscription in subscriptions {
            // The receiver is alive until the pool drains.
            let _ = tx.send(subscription);
        }
        drop(tx);
        let queue: SubscriptionQueue = Arc::new(Mutex::new(rx));

        let mut pool = JoinSet::new();
        for worker in 0..self.workers.min(total) {
            let this = self.clone();
            let queue = queue.clone();
            let cancel = cancel.clone();
            pool.spawn(
                async move { this.worker_loop(queue, cancel, mode).await }
                    .instrument(tracing::info_span!("scrape_worker", worker)),
            );
        }

        let mut summary = CycleSummary {
            total,
            ..Default::default()
        };
        let mut failures = Vec::new();
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(report) => {
                    summary.synced += report.synced;
                    summary.stats.merge(report.stats);
                    failures.extend(report.failures);
                }
                Err(e) => error!("Scrape worker terminated abnormally: {}", e),
            }
        }
        summary.skipped = total - summary.synced - failures.len();

        if !failures.is_empty() {
            return Err(ScrapeError::SubscriptionsFailed { failures, total });
        }

        info!(
            "Scrape cycle finished: {} synced, {} skipped, {} new, {} price changes, {} baseline.",
            summary.synced,
            summary.skipped,
            summary.stats.new_listings,
            summary.stats.price_changes,
            summary.stats.baseline
        );
        Ok(summary)
    }

    async fn worker_loop(
        &self,
        queue: SubscriptionQueue,
        cancel: CancellationToken,
        mode: ScrapeMode,
    ) -> WorkerReport {
        let mut report = WorkerReport::default();

        loop {
            if cancel.is_cancelled() {
                debug!("Cancellation requested. Worker stops taking subscriptions.");
                break;
            }
            let next = queue.lock().await.recv().await;
            let Some(subscription) = next else {
                break;
            };

            let result = AssertUnwindSafe(self.sync_subscription(&subscription, mode))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(SyncError::Panicked {
                        message: panic_message(panic.as_ref()),
                    })
                });

            match result {
                Ok(stats) => {
                    report.synced += 1;
                    report.stats.merge(stats);
                }
                Err(e) => {
                    error!("Failed to sync subscription `{}`: {}", subscription.id, e);
                    report.failures.push(SubscriptionFailure {
                        subscription_id: subscription.id,
                        error: e,
                    });
                }
            }
        }

        report
    }

    /// Fetches, diffs and persists a single subscription.
    ///
    /// Every upsert is attempted even when some fail; the sync is reported failed if any did.
    pub async fn sync_subscription(
        &self,
        subscription: &Subscription,
        mode: ScrapeMode,
    ) -> Result<SyncStats, SyncError> {
        let params = build_params(subscription, &self.taxonomy, mode);
        let fetched = self.client.fetch_listings(&params).await?;
        let existing = self
            .repository
            .get_listings_for_subscription(&subscription.id)
            .await
            .map_err(SyncError::LoadListings)?;

        let diff_mode = match mode {
            ScrapeMode::All => DiffMode::Baseline,
            ScrapeMode::NewOnly => DiffMode::Incremental,
        };
        let ops = self
            .detector
            .diff_with(&subscription.id, &existing, &fetched, diff_mode);
        debug!(
            "Subscription `{}`: fetched {}, stored {}, {} upserts.",
            subscription.id,
            fetched.len(),
            existing.len(),
            ops.len()
        );

        let total = ops.len();
        let mut stats = SyncStats::default();
        let mut failed = 0;
        let mut first_error = None;
        for op in ops {
            let listing_id = op.listing.listing_id.clone();
            match self.repository.upsert_listing(op.listing).await {
                Ok(()) => stats.record(op.kind),
                Err(e) => {
                    warn!(
                        "Failed to upsert listing `{}` of subscription `{}`: {}",
                        listing_id, subscription.id, e
                    );
                    failed += 1;
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(first) => Err(SyncError::Persist {
                failed,
                total,
                first,
            }),
            None => Ok(stats),
        }
    }
}

/// Translates a subscription into marketplace query parameters.
///
/// Chassis names unknown to the taxonomy are dropped. Empty filters are omitted.
pub fn build_params(
    subscription: &Subscription,
    taxonomy: &TaxonomyCache,
    mode: ScrapeMode,
) -> CrawlParams {
    let mut params = CrawlParams::new();
    params.insert(PARAM_BRAND.to_string(), subscription.brand.clone());
    params.insert(PARAM_SHOW_OLD_NEW.to_string(), "all".to_string());

    let ranges = [
        (PARAM_PRICE_FROM, &subscription.price_from),
        (PARAM_PRICE_TO, &subscription.price_to),
        (PARAM_YEAR_FROM, &subscription.year_from),
        (PARAM_YEAR_TO, &subscription.year_to),
    ];
    for (key, value) in ranges {
        if !value.is_empty() {
            params.insert(key.to_string(), value.clone());
        }
    }

    if !subscription.models.is_empty() {
        params.insert(PARAM_MODEL.to_string(), subscription.models.join(","));
    }
    if !subscription.regions.is_empty() {
        params.insert(PARAM_REGION.to_string(), subscription.regions.join(","));
    }
    let chassis = taxonomy.resolve_chassis(&subscription.chassis);
    if !chassis.is_empty() {
        params.insert(PARAM_CHASSIS.to_string(), chassis.join(","));
    }

    if mode == ScrapeMode::NewOnly {
        params.insert(PARAM_SORT.to_string(), SORT_NEWEST.to_string());
        params.insert(PARAM_DATE_LIMIT.to_string(), DATE_LIMIT_ONE_DAY.to_string());
    }

    params
}
