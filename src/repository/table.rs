//! Table handlers over the SQLite pool.

use chrono::DateTime;
use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::types::Json;

use crate::entity::Listing;
use crate::entity::ListingUpsert;
use crate::entity::NotificationRecord;
use crate::entity::Subscription;
use crate::entity::UserId;
use crate::repository::error::RepositoryError;

/// Base table struct providing database pool access.
#[derive(Clone)]
pub struct BaseTable {
    pub pool: SqlitePool,
}

impl BaseTable {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Clone)]
pub struct SubscriptionTable {
    base: BaseTable,
}

impl SubscriptionTable {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            base: BaseTable::new(pool),
        }
    }

    pub async fn select_all(&self) -> Result<Vec<Subscription>, RepositoryError> {
        Ok(
            sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions ORDER BY created_at")
                .fetch_all(&self.base.pool)
                .await?,
        )
    }

    pub async fn select(&self, id: &str) -> Result<Option<Subscription>, RepositoryError> {
        Ok(
            sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.base.pool)
                .await?,
        )
    }

    pub async fn select_all_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Subscription>, RepositoryError> {
        Ok(sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE user_id = ? ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.base.pool)
        .await?)
    }

    /// Inserts the subscription, or replaces every field but `created_at` if the id exists.
    ///
    /// A plain `INSERT OR REPLACE` would delete the old row and cascade into its listings.
    pub async fn upsert(&self, model: &Subscription) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions
                (id, user_id, brand, models, chassis, regions,
                 price_from, price_to, year_from, year_to, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                brand = excluded.brand,
                models = excluded.models,
                chassis = excluded.chassis,
                regions = excluded.regions,
                price_from = excluded.price_from,
                price_to = excluded.price_to,
                year_from = excluded.year_from,
                year_to = excluded.year_to,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&model.id)
        .bind(model.user_id)
        .bind(&model.brand)
        .bind(Json(&model.models))
        .bind(Json(&model.chassis))
        .bind(Json(&model.regions))
        .bind(&model.price_from)
        .bind(&model.price_to)
        .bind(&model.year_from)
        .bind(&model.year_to)
        .bind(model.created_at)
        .bind(model.updated_at)
        .execute(&self.base.pool)
        .await?;
        Ok(())
    }

    /// Returns whether a row was deleted. Listings go with it through the cascade.
    pub async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        let res = sqlx::query("DELETE FROM subscriptions WHERE id = ?")
            .bind(id)
            .execute(&self.base.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Returns the number of subscriptions deleted.
    pub async fn delete_all_by_user(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let res = sqlx::query("DELETE FROM subscriptions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.base.pool)
            .await?;
        Ok(res.rows_affected())
    }
}

#[derive(Clone)]
pub struct ListingTable {
    base: BaseTable,
}

impl ListingTable {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            base: BaseTable::new(pool),
        }
    }

    pub async fn select_all(&self) -> Result<Vec<Listing>, RepositoryError> {
        Ok(sqlx::query_as::<_, Listing>(
            "SELECT * FROM listings ORDER BY subscription_id, listing_id",
        )
        .fetch_all(&self.base.pool)
        .await?)
    }

    pub async fn select(
        &self,
        subscription_id: &str,
        listing_id: &str,
    ) -> Result<Option<Listing>, RepositoryError> {
        Ok(sqlx::query_as::<_, Listing>(
            "SELECT * FROM listings WHERE subscription_id = ? AND listing_id = ?",
        )
        .bind(subscription_id)
        .bind(listing_id)
        .fetch_optional(&self.base.pool)
        .await?)
    }

    pub async fn select_all_by_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<Listing>, RepositoryError> {
        Ok(sqlx::query_as::<_, Listing>(
            "SELECT * FROM listings WHERE subscription_id = ? ORDER BY listing_id",
        )
        .bind(subscription_id)
        .fetch_all(&self.base.pool)
        .await?)
    }

    pub async fn select_all_pending(&self) -> Result<Vec<Listing>, RepositoryError> {
        Ok(sqlx::query_as::<_, Listing>(
            "SELECT * FROM listings WHERE needs_send = TRUE ORDER BY created_at, listing_id",
        )
        .fetch_all(&self.base.pool)
        .await?)
    }

    /// Inserts or replaces the row keyed by `(listing_id, subscription_id)`, keeping
    /// `created_at` of an existing row.
    pub async fn upsert(
        &self,
        model: &ListingUpsert,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO listings
                (listing_id, subscription_id, title, price, new_price, engine_volume,
                 transmission, body_type, mileage, location, link, date, needs_send,
                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(listing_id, subscription_id) DO UPDATE SET
                title = excluded.title,
                price = excluded.price,
                new_price = excluded.new_price,
                engine_volume = excluded.engine_volume,
                transmission = excluded.transmission,
                body_type = excluded.body_type,
                mileage = excluded.mileage,
                location = excluded.location,
                link = excluded.link,
                date = excluded.date,
                needs_send = excluded.needs_send,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&model.listing_id)
        .bind(&model.subscription_id)
        .bind(&model.title)
        .bind(&model.price)
        .bind(&model.new_price)
        .bind(&model.engine_volume)
        .bind(&model.transmission)
        .bind(&model.body_type)
        .bind(&model.mileage)
        .bind(&model.location)
        .bind(&model.link)
        .bind(model.date)
        .bind(model.needs_send)
        .bind(now)
        .bind(now)
        .execute(&self.base.pool)
        .await?;
        Ok(())
    }

    /// Promotes `new_price` to `price` and clears the pending state, provided the row
    /// still carries `expected_new_price`. Returns whether the row was updated.
    pub async fn mark_delivered(
        &self,
        subscription_id: &str,
        listing_id: &str,
        expected_new_price: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let res = sqlx::query(
            r#"
            UPDATE listings
            SET price = COALESCE(new_price, price),
                new_price = NULL,
                needs_send = FALSE,
                updated_at = ?
            WHERE subscription_id = ?
                AND listing_id = ?
                AND needs_send = TRUE
                AND new_price IS ?
            "#,
        )
        .bind(now)
        .bind(subscription_id)
        .bind(listing_id)
        .bind(expected_new_price)
        .execute(&self.base.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn touch(
        &self,
        subscription_id: &str,
        listing_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE listings SET updated_at = ? WHERE subscription_id = ? AND listing_id = ?",
        )
        .bind(now)
        .bind(subscription_id)
        .bind(listing_id)
        .execute(&self.base.pool)
        .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct NotificationTable {
    base: BaseTable,
}

impl NotificationTable {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            base: BaseTable::new(pool),
        }
    }

    pub async fn select_all(&self) -> Result<Vec<NotificationRecord>, RepositoryError> {
        Ok(sqlx::query_as::<_, NotificationRecord>(
            "SELECT * FROM notifications ORDER BY created_at",
        )
        .fetch_all(&self.base.pool)
        .await?)
    }

    pub async fn select_all_by_listing(
        &self,
        subscription_id: &str,
        listing_id: &str,
    ) -> Result<Vec<NotificationRecord>, RepositoryError> {
        Ok(sqlx::query_as::<_, NotificationRecord>(
            r#"
            SELECT * FROM notifications
            WHERE subscription_id = ? AND listing_id = ?
            ORDER BY created_at
            "#,
        )
        .bind(subscription_id)
        .bind(listing_id)
        .fetch_all(&self.base.pool)
        .await?)
    }

    pub async fn insert(&self, model: &NotificationRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, subscription_id, listing_id, status, reason, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(model.id)
        .bind(&model.subscription_id)
        .bind(&model.listing_id)
        .bind(model.status)
        .bind(&model.reason)
        .bind(model.created_at)
        .bind(model.updated_at)
        .execute(&self.base.pool)
        .await?;
        Ok(())
    }
}
