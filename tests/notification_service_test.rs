//! Integration tests for the notification dispatcher.

use std::sync::Arc;

use async_trait::async_trait;
use auto_alert::delivery::DeliveryChannel;
use auto_alert::delivery::DeliveryError;
use auto_alert::entity::Listing;
use auto_alert::entity::ListingUpsert;
use auto_alert::entity::NotificationRecord;
use auto_alert::entity::NotificationStatus;
use auto_alert::entity::Subscription;
use auto_alert::entity::UserId;
use auto_alert::repository::Repository;
use auto_alert::repository::error::RepositoryError;
use auto_alert::repository::sqlite::SqliteRepository;
use auto_alert::service::notification_service::NotificationService;
use tokio_util::sync::CancellationToken;

mod common;

mockall::mock! {
    pub Channel {}

    #[async_trait]
    impl DeliveryChannel for Channel {
        async fn send(&self, user_id: UserId, message: &str) -> Result<(), DeliveryError>;
    }
}

async fn seed_subscription(repository: &SqliteRepository, user_id: UserId) -> Subscription {
    repository
        .create_subscription(common::subscription(user_id, "bmw"))
        .await
        .expect("Failed to create subscription")
}

async fn seed_pending(
    repository: &SqliteRepository,
    subscription: &Subscription,
    id: &str,
    price: &str,
    new_price: Option<&str>,
) {
    let mut upsert = ListingUpsert::from_raw(&subscription.id, &common::raw_listing(id, price));
    upsert.new_price = new_price.map(str::to_string);
    upsert.needs_send = true;
    repository
        .upsert_listing(upsert)
        .await
        .expect("Failed to upsert listing");
}

#[tokio::test]
async fn test_dispatch_success_clears_pending() {
    let (repository, db_path) = common::setup_db().await;
    let channel = common::FakeChannel::new();
    let sub = seed_subscription(&repository, 10).await;
    seed_pending(&repository, &sub, "A", "100", Some("150")).await;

    let service = NotificationService::new(repository.clone(), Arc::new(channel.clone()))
        .expect("Failed to create service");
    let summary = service
        .process_pending(&CancellationToken::new())
        .await
        .expect("Failed to process pending");

    // 1. Exactly one message to the owner
    assert_eq!(summary.sent, 1);
    let sent = channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, 10);
    assert!(sent[0].1.contains("⚠100🔺150"));

    // 2. Pending state cleared, price promoted
    let listing = common::stored_listing(&repository, &sub.id, "A").await;
    assert!(!listing.needs_send);
    assert_eq!(listing.new_price, None);
    assert_eq!(listing.price, "150");

    // 3. Exactly one Sent record
    let records = repository
        .notification
        .select_all_by_listing(&sub.id, "A")
        .await
        .expect("Failed to load records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, NotificationStatus::Sent);

    // 4. Nothing left to send on the next tick
    let summary = service
        .process_pending(&CancellationToken::new())
        .await
        .expect("Failed to process pending");
    assert_eq!(summary.pending, 0);
    assert_eq!(channel.attempts(), 1);

    common::teardown_db(db_path).await;
}

#[tokio::test]
async fn test_dispatch_transient_failure_keeps_pending() {
    let (repository, db_path) = common::setup_db().await;
    let channel = common::FakeChannel::new();
    let sub = seed_subscription(&repository, 11).await;
    seed_pending(&repository, &sub, "A", "100", Some("150")).await;
    channel.script(
        11,
        Err(DeliveryError::Transient {
            reason: "Too Many Requests".to_string(),
        }),
    );

    let service = NotificationService::new(repository.clone(), Arc::new(channel.clone()))
        .expect("Failed to create service");
    let summary = service
        .process_pending(&CancellationToken::new())
        .await
        .expect("Failed to process pending");
    assert_eq!(summary.failed, 1);

    let listing = common::stored_listing(&repository, &sub.id, "A").await;
    assert!(listing.needs_send);
    assert_eq!(listing.price, "100");
    assert_eq!(listing.new_price.as_deref(), Some("150"));

    let records = repository
        .notification
        .select_all_by_listing(&sub.id, "A")
        .await
        .expect("Failed to load records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, NotificationStatus::Failed);
    assert_eq!(records[0].reason, "Too Many Requests");

    // Retried on the next tick, which succeeds
    let summary = service
        .process_pending(&CancellationToken::new())
        .await
        .expect("Failed to process pending");
    assert_eq!(summary.sent, 1);
    let records = repository
        .notification
        .select_all()
        .await
        .expect("Failed to load records");
    assert_eq!(records.len(), 2);

    common::teardown_db(db_path).await;
}

#[tokio::test]
async fn test_recipient_gone_removes_user_data() {
    let (repository, db_path) = common::setup_db().await;
    let channel = common::FakeChannel::new();
    let gone_a = seed_subscription(&repository, 12).await;
    let gone_b = seed_subscription(&repository, 12).await;
    let other = seed_subscription(&repository, 13).await;
    seed_pending(&repository, &gone_a, "A", "100", None).await;
    seed_pending(&repository, &gone_b, "B", "200", None).await;
    seed_pending(&repository, &other, "C", "300", None).await;
    channel.always_gone(12, 2);

    let service = NotificationService::new(repository.clone(), Arc::new(channel.clone()))
        .expect("Failed to create service");
    let summary = service
        .process_pending(&CancellationToken::new())
        .await
        .expect("Failed to process pending");

    assert_eq!(summary.recipients_removed, 1);
    assert_eq!(summary.sent, 1);

    // 1. Everything of user 12 is gone, user 13 untouched
    assert!(
        repository
            .get_subscriptions_for_user(12)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(
        repository
            .get_listings_for_subscription(&gone_a.id)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(
        repository
            .get_listings_for_subscription(&gone_b.id)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        repository.get_subscriptions_for_user(13).await.unwrap().len(),
        1
    );

    // 2. No audit record for the unreachable user
    let records = repository
        .notification
        .select_all()
        .await
        .expect("Failed to load records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].subscription_id, other.id);

    // 3. Cleanup is idempotent
    repository
        .delete_subscriptions_and_listings_for_user(12)
        .await
        .expect("Repeated cleanup should succeed");

    common::teardown_db(db_path).await;
}

/// Repository whose subscription lookups always fail.
struct LookupFailingRepository {
    inner: Arc<SqliteRepository>,
}

#[async_trait]
impl Repository for LookupFailingRepository {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, RepositoryError> {
        self.inner.list_subscriptions().await
    }

    async fn get_subscription_by_id(&self, id: &str) -> Result<Subscription, RepositoryError> {
        Err(RepositoryError::NotFound {
            entity: "subscription",
            id: id.to_string(),
        })
    }

    async fn get_subscriptions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Subscription>, RepositoryError> {
        self.inner.get_subscriptions_for_user(user_id).await
    }

    async fn create_subscription(
        &self,
        subscription: Subscription,
    ) -> Result<Subscription, RepositoryError> {
        self.inner.create_subscription(subscription).await
    }

    async fn delete_subscription(&self, id: &str) -> Result<(), RepositoryError> {
        self.inner.delete_subscription(id).await
    }

    async fn get_listings_for_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<Listing>, RepositoryError> {
        self.inner.get_listings_for_subscription(subscription_id).await
    }

    async fn upsert_listing(&self, listing: ListingUpsert) -> Result<(), RepositoryError> {
        self.inner.upsert_listing(listing).await
    }

    async fn get_pending_listings(&self) -> Result<Vec<Listing>, RepositoryError> {
        self.inner.get_pending_listings().await
    }

    async fn mark_delivered(&self, listing: &Listing) -> Result<bool, RepositoryError> {
        self.inner.mark_delivered(listing).await
    }

    async fn touch_listing(
        &self,
        subscription_id: &str,
        listing_id: &str,
    ) -> Result<(), RepositoryError> {
        self.inner.touch_listing(subscription_id, listing_id).await
    }

    async fn record_notification(
        &self,
        record: NotificationRecord,
    ) -> Result<(), RepositoryError> {
        self.inner.record_notification(record).await
    }

    async fn delete_subscriptions_and_listings_for_user(
        &self,
        user_id: UserId,
    ) -> Result<(), RepositoryError> {
        self.inner
            .delete_subscriptions_and_listings_for_user(user_id)
            .await
    }
}

#[tokio::test]
async fn test_unresolved_subscription_is_skipped() {
    let (inner, db_path) = common::setup_db().await;
    let sub = seed_subscription(&inner, 14).await;
    seed_pending(&inner, &sub, "A", "100", None).await;
    let repository = Arc::new(LookupFailingRepository { inner });

    let mut channel = MockChannel::new();
    channel.expect_send().never();

    let service = NotificationService::new(repository.clone(), Arc::new(channel))
        .expect("Failed to create service");
    let summary = service
        .process_pending(&CancellationToken::new())
        .await
        .expect("Failed to process pending");

    // Left pending, nothing recorded
    assert_eq!(summary.unresolved, 1);
    assert!(
        repository
            .inner
            .notification
            .select_all()
            .await
            .expect("Failed to load records")
            .is_empty()
    );
    let listing = common::stored_listing(&repository.inner, &sub.id, "A").await;
    assert!(listing.needs_send);

    common::teardown_db(db_path).await;
}

#[tokio::test]
async fn test_message_is_markdown_escaped() {
    let (repository, db_path) = common::setup_db().await;
    let sub = seed_subscription(&repository, 15).await;
    seed_pending(&repository, &sub, "A", "12.500 €", None).await;

    let mut channel = MockChannel::new();
    channel
        .expect_send()
        .withf(|user_id, message| *user_id == 15 && message.contains("12\\.500 €"))
        .times(1)
        .returning(|_, _| Ok(()));

    let service = NotificationService::new(repository.clone(), Arc::new(channel))
        .expect("Failed to create service");
    let summary = service
        .process_pending(&CancellationToken::new())
        .await
        .expect("Failed to process pending");

    assert_eq!(summary.sent, 1);

    common::teardown_db(db_path).await;
}

/// Channel that stores a newer price for the listing while the message is in flight.
struct PriceChangingChannel {
    repository: Arc<SqliteRepository>,
    change: ListingUpsert,
}

#[async_trait]
impl DeliveryChannel for PriceChangingChannel {
    async fn send(&self, _user_id: UserId, _message: &str) -> Result<(), DeliveryError> {
        self.repository
            .upsert_listing(self.change.clone())
            .await
            .map_err(|e| DeliveryError::Transient {
                reason: e.to_string(),
            })
    }
}

#[tokio::test]
async fn test_price_change_during_send_is_not_overwritten() {
    let (repository, db_path) = common::setup_db().await;
    let sub = seed_subscription(&repository, 16).await;
    seed_pending(&repository, &sub, "A", "100", None).await;

    let mut change = ListingUpsert::from_raw(&sub.id, &common::raw_listing("A", "100"));
    change.new_price = Some("180".to_string());
    change.needs_send = true;
    let channel = PriceChangingChannel {
        repository: repository.clone(),
        change,
    };

    let service = NotificationService::new(repository.clone(), Arc::new(channel))
        .expect("Failed to create service");
    let summary = service
        .process_pending(&CancellationToken::new())
        .await
        .expect("Failed to process pending");
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.persist_errors, 0);

    // The change stored mid-send stays pending for the next tick
    let listing = common::stored_listing(&repository, &sub.id, "A").await;
    assert!(listing.needs_send);
    assert_eq!(listing.price, "100");
    assert_eq!(listing.new_price.as_deref(), Some("180"));
    let records = repository
        .notification
        .select_all_by_listing(&sub.id, "A")
        .await
        .expect("Failed to load records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, NotificationStatus::Sent);

    common::teardown_db(db_path).await;
}
