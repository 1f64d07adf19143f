//! Domain entities shared by the scraper, the dispatcher and the repository.

use chrono::DateTime;
use chrono::Utc;
use derive_builder::Builder;
use serde::Deserialize;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Chat identifier of the user owning a subscription.
pub type UserId = i64;

/// A saved search owned by a user.
#[derive(Builder, FromRow, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[builder(setter(into))]
pub struct Subscription {
    #[builder(default = "Uuid::new_v4().to_string()")]
    pub id: String,
    pub user_id: UserId,
    pub brand: String,
    #[builder(default)]
    #[sqlx(json)]
    pub models: Vec<String>,
    #[builder(default)]
    #[sqlx(json)]
    pub chassis: Vec<String>,
    #[builder(default)]
    #[sqlx(json)]
    pub regions: Vec<String>,
    #[builder(default)]
    pub price_from: String,
    #[builder(default)]
    pub price_to: String,
    #[builder(default)]
    pub year_from: String,
    #[builder(default)]
    pub year_to: String,
    #[builder(default = "Utc::now()")]
    pub created_at: DateTime<Utc>,
    #[builder(default = "Utc::now()")]
    pub updated_at: DateTime<Utc>,
}

/// A listing as parsed from a marketplace result page.
#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct RawListing {
    pub id: String,
    pub title: String,
    pub price: String,
    pub year: String,
    pub engine_volume: String,
    pub transmission: String,
    pub body_type: String,
    pub mileage: String,
    pub location: String,
    pub link: String,
    pub date: Option<DateTime<Utc>>,
}

/// A persisted listing matched to one subscription.
///
/// `new_price` is only populated while a price-change notification is pending.
#[derive(FromRow, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Listing {
    pub listing_id: String,
    pub subscription_id: String,
    pub title: String,
    pub price: String,
    pub new_price: Option<String>,
    pub engine_volume: String,
    pub transmission: String,
    pub body_type: String,
    pub mileage: String,
    pub location: String,
    pub link: String,
    pub date: Option<DateTime<Utc>>,
    pub needs_send: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    /// Price the marketplace reported most recently for this listing.
    pub fn last_known_price(&self) -> &str {
        self.new_price.as_deref().unwrap_or(&self.price)
    }
}

/// Write model for a listing row, keyed by `(listing_id, subscription_id)`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ListingUpsert {
    pub listing_id: String,
    pub subscription_id: String,
    pub title: String,
    pub price: String,
    pub new_price: Option<String>,
    pub engine_volume: String,
    pub transmission: String,
    pub body_type: String,
    pub mileage: String,
    pub location: String,
    pub link: String,
    pub date: Option<DateTime<Utc>>,
    pub needs_send: bool,
}

impl ListingUpsert {
    /// Builds an upsert carrying the display fields of a freshly fetched listing.
    pub fn from_raw(subscription_id: &str, raw: &RawListing) -> Self {
        Self {
            listing_id: raw.id.clone(),
            subscription_id: subscription_id.to_string(),
            title: raw.title.clone(),
            price: raw.price.clone(),
            new_price: None,
            engine_volume: raw.engine_volume.clone(),
            transmission: raw.transmission.clone(),
            body_type: raw.body_type.clone(),
            mileage: raw.mileage.clone(),
            location: raw.location.clone(),
            link: raw.link.clone(),
            date: raw.date,
            needs_send: false,
        }
    }
}

impl From<&Listing> for ListingUpsert {
    fn from(listing: &Listing) -> Self {
        Self {
            listing_id: listing.listing_id.clone(),
            subscription_id: listing.subscription_id.clone(),
            title: listing.title.clone(),
            price: listing.price.clone(),
            new_price: listing.new_price.clone(),
            engine_volume: listing.engine_volume.clone(),
            transmission: listing.transmission.clone(),
            body_type: listing.body_type.clone(),
            mileage: listing.mileage.clone(),
            location: listing.location.clone(),
            link: listing.link.clone(),
            date: listing.date,
            needs_send: listing.needs_send,
        }
    }
}

#[derive(Serialize, Deserialize, sqlx::Type, Clone, Copy, Debug, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Sent,
    Failed,
}

/// Append-only audit record of one delivery attempt.
#[derive(FromRow, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub subscription_id: String,
    pub listing_id: String,
    pub status: NotificationStatus,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn sent(listing: &Listing) -> Self {
        Self::new(listing, NotificationStatus::Sent, String::new())
    }

    pub fn failed(listing: &Listing, reason: impl Into<String>) -> Self {
        Self::new(listing, NotificationStatus::Failed, reason.into())
    }

    fn new(listing: &Listing, status: NotificationStatus, reason: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            subscription_id: listing.subscription_id.clone(),
            listing_id: listing.listing_id.clone(),
            status,
            reason,
            created_at: now,
            updated_at: now,
        }
    }
}
