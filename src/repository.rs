//! Storage capability for subscriptions, listings and notification audit records.

use async_trait::async_trait;

use crate::entity::Listing;
use crate::entity::ListingUpsert;
use crate::entity::NotificationRecord;
use crate::entity::Subscription;
use crate::entity::UserId;
use crate::repository::error::RepositoryError;

pub mod error;
pub mod sqlite;
pub mod table;

/// Durable storage consumed by the scraper and the dispatcher.
///
/// Implementations must be safe for concurrent use; the scrape worker pool calls them
/// from several tasks at once.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, RepositoryError>;

    /// Returns the subscription or `RepositoryError::NotFound`.
    async fn get_subscription_by_id(&self, id: &str) -> Result<Subscription, RepositoryError>;

    async fn get_subscriptions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Subscription>, RepositoryError>;

    async fn create_subscription(
        &self,
        subscription: Subscription,
    ) -> Result<Subscription, RepositoryError>;

    /// Deletes one subscription together with its listings.
    async fn delete_subscription(&self, id: &str) -> Result<(), RepositoryError>;

    async fn get_listings_for_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<Listing>, RepositoryError>;

    /// Inserts or replaces the row keyed by `(listing_id, subscription_id)`.
    async fn upsert_listing(&self, listing: ListingUpsert) -> Result<(), RepositoryError>;

    /// Returns every listing with `needs_send` set.
    async fn get_pending_listings(&self) -> Result<Vec<Listing>, RepositoryError>;

    /// Clears the pending state of a delivered listing and promotes its `new_price`.
    ///
    /// Applies only while the stored row still carries the `new_price` of `listing`, so a
    /// price change stored during delivery is not lost. Returns whether the row changed.
    async fn mark_delivered(&self, listing: &Listing) -> Result<bool, RepositoryError>;

    /// Bumps `updated_at` after a failed attempt. The pending state is left as stored.
    async fn touch_listing(
        &self,
        subscription_id: &str,
        listing_id: &str,
    ) -> Result<(), RepositoryError>;

    async fn record_notification(&self, record: NotificationRecord)
    -> Result<(), RepositoryError>;

    /// Removes every subscription of the user and their listings. A no-op for unknown users.
    async fn delete_subscriptions_and_listings_for_user(
        &self,
        user_id: UserId,
    ) -> Result<(), RepositoryError>;
}
