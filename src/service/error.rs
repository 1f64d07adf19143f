use std::fmt;

use crate::marketplace::error::MarketplaceError;
use crate::repository::error::RepositoryError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ServiceError {
    #[error("Unexpected result: {message}")]
    UnexpectedResult { message: String },

    #[error("MarketplaceError: {0}")]
    MarketplaceError(#[from] MarketplaceError),

    #[error("RepositoryError: {0}")]
    RepositoryError(#[from] RepositoryError),
}

/// Failure syncing a single subscription.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] MarketplaceError),

    #[error("failed to load existing listings: {0}")]
    LoadListings(#[source] RepositoryError),

    #[error("{failed} of {total} listing upserts failed, first: {first}")]
    Persist {
        failed: usize,
        total: usize,
        #[source]
        first: RepositoryError,
    },

    #[error("worker panicked: {message}")]
    Panicked { message: String },
}

#[derive(Debug)]
pub struct SubscriptionFailure {
    pub subscription_id: String,
    pub error: SyncError,
}

impl fmt::Display for SubscriptionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscription `{}`: {}", self.subscription_id, self.error)
    }
}

/// Cycle-level scrape error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ScrapeError {
    #[error("Failed to load subscriptions: {0}")]
    LoadSubscriptions(#[from] RepositoryError),

    #[error("{} of {total} subscriptions failed: {}", .failures.len(), join(.failures))]
    SubscriptionsFailed {
        failures: Vec<SubscriptionFailure>,
        total: usize,
    },
}

fn join(failures: &[SubscriptionFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
