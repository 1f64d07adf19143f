//! Repository backed by SQLite through SQLx.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use log::info;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::sqlite::SqliteJournalMode;

use crate::entity::Listing;
use crate::entity::ListingUpsert;
use crate::entity::NotificationRecord;
use crate::entity::Subscription;
use crate::entity::UserId;
use crate::repository::Repository;
use crate::repository::error::RepositoryError;
use crate::repository::table::ListingTable;
use crate::repository::table::NotificationTable;
use crate::repository::table::SubscriptionTable;

/// SQLite repository with one handler per table.
pub struct SqliteRepository {
    pool: SqlitePool,
    pub subscription: SubscriptionTable,
    pub listing: ListingTable,
    pub notification: NotificationTable,
}

impl SqliteRepository {
    /// Connects to the database, creating the file at `db_path` if it does not exist.
    pub async fn new(db_url: &str, db_path: &str) -> Result<Self, RepositoryError> {
        let path = std::path::Path::new(db_path);
        if !path.exists() {
            debug!("Database path {db_path} does not exist. Creating...");
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, "")?;
            info!("Created {db_path}");
        }

        debug!("Connecting to db...");
        let opts = SqliteConnectOptions::from_str(db_url)?
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePool::connect_with(opts).await?;
        info!("Connected to db.");

        Ok(Self {
            subscription: SubscriptionTable::new(pool.clone()),
            listing: ListingTable::new(pool.clone()),
            notification: NotificationTable::new(pool.clone()),
            pool,
        })
    }

    /// Runs database migrations from the migrations directory.
    pub async fn run_migrations(&self) -> Result<(), RepositoryError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    fn subscription_not_found(id: &str) -> RepositoryError {
        RepositoryError::NotFound {
            entity: "subscription",
            id: id.to_string(),
        }
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, RepositoryError> {
        self.subscription.select_all().await
    }

    async fn get_subscription_by_id(&self, id: &str) -> Result<Subscription, RepositoryError> {
        self.subscription
            .select(id)
            .await?
            .ok_or_else(|| Self::subscription_not_found(id))
    }

    async fn get_subscriptions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Subscription>, RepositoryError> {
        self.subscription.select_all_by_user(user_id).await
    }

    async fn create_subscription(
        &self,
        subscription: Subscription,
    ) -> Result<Subscription, RepositoryError> {
        self.subscription.upsert(&subscription).await?;
        Ok(subscription)
    }

    async fn delete_subscription(&self, id: &str) -> Result<(), RepositoryError> {
        if self.subscription.delete(id).await? {
            Ok(())
        } else {
            Err(Self::subscription_not_found(id))
        }
    }

    async fn get_listings_for_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<Listing>, RepositoryError> {
        self.listing.select_all_by_subscription(subscription_id).await
    }

    async fn upsert_listing(&self, upsert: ListingUpsert) -> Result<(), RepositoryError> {
        match self.listing.upsert(&upsert, Utc::now()).await {
            Err(e) if e.is_foreign_key_violation() => {
                Err(Self::subscription_not_found(&upsert.subscription_id))
            }
            res => res,
        }
    }

    async fn get_pending_listings(&self) -> Result<Vec<Listing>, RepositoryError> {
        self.listing.select_all_pending().await
    }

    async fn mark_delivered(&self, listing: &Listing) -> Result<bool, RepositoryError> {
        self.listing
            .mark_delivered(
                &listing.subscription_id,
                &listing.listing_id,
                listing.new_price.as_deref(),
                Utc::now(),
            )
            .await
    }

    async fn touch_listing(
        &self,
        subscription_id: &str,
        listing_id: &str,
    ) -> Result<(), RepositoryError> {
        self.listing
            .touch(subscription_id, listing_id, Utc::now())
            .await
    }

    async fn record_notification(
        &self,
        record: NotificationRecord,
    ) -> Result<(), RepositoryError> {
        self.notification.insert(&record).await
    }

    async fn delete_subscriptions_and_listings_for_user(
        &self,
        user_id: UserId,
    ) -> Result<(), RepositoryError> {
        let removed = self.subscription.delete_all_by_user(user_id).await?;
        debug!("Removed {} subscriptions of user {}", removed, user_id);
        Ok(())
    }
}
