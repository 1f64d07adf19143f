//! Delivers pending listings and records the outcome of every attempt.

use std::collections::HashSet;
use std::sync::Arc;

use log::debug;
use log::error;
use log::info;
use log::warn;
use tokio_util::sync::CancellationToken;

use crate::delivery::DeliveryChannel;
use crate::delivery::DeliveryError;
use crate::delivery::message::MessageRenderer;
use crate::entity::Listing;
use crate::entity::NotificationRecord;
use crate::entity::UserId;
use crate::repository::Repository;
use crate::repository::error::RepositoryError;
use crate::service::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Failed,
    RecipientGone,
    /// The owning subscription could not be loaded; nothing was written.
    Unresolved,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub pending: usize,
    pub sent: usize,
    pub failed: usize,
    pub recipients_removed: usize,
    pub unresolved: usize,
    /// Listings left pending because the tick was cancelled.
    pub skipped: usize,
    /// Listings whose outcome could not be fully persisted.
    pub persist_errors: usize,
}

impl DispatchSummary {
    fn record(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Sent => self.sent += 1,
            DispatchOutcome::Failed => self.failed += 1,
            DispatchOutcome::RecipientGone => self.recipients_removed += 1,
            DispatchOutcome::Unresolved => self.unresolved += 1,
        }
    }
}

/// Notification dispatcher.
pub struct NotificationService {
    repository: Arc<dyn Repository>,
    channel: Arc<dyn DeliveryChannel>,
    renderer: MessageRenderer,
}

impl NotificationService {
    pub fn new(
        repository: Arc<dyn Repository>,
        channel: Arc<dyn DeliveryChannel>,
    ) -> Result<Self, ServiceError> {
        let renderer = MessageRenderer::new().map_err(|e| ServiceError::UnexpectedResult {
            message: format!("failed to compile message template: {e}"),
        })?;
        info!("Initializing NotificationService.");
        Ok(Self {
            repository,
            channel,
            renderer,
        })
    }

    /// Delivers every listing with `needs_send` set, one at a time.
    ///
    /// Only failing to load the pending set is returned as an error; per-listing failures
    /// are logged and counted in the summary.
    pub async fn process_pending(
        &self,
        cancel: &CancellationToken,
    ) -> Result<DispatchSummary, ServiceError> {
        let pending = self.repository.get_pending_listings().await?;
        let mut summary = DispatchSummary {
            pending: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            debug!("No pending listings.");
            return Ok(summary);
        }
        info!("Dispatching {} pending listings.", pending.len());

        let mut removed_users: HashSet<UserId> = HashSet::new();
        for (index, listing) in pending.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.skipped = pending.len() - index;
                info!("Dispatch cancelled. {} listings left pending.", summary.skipped);
                break;
            }

            match self.dispatch(listing, &mut removed_users).await {
                Ok(outcome) => summary.record(outcome),
                Err((outcome, e)) => {
                    error!(
                        "Failed to persist dispatch outcome of listing `{}` (subscription `{}`): {}",
                        listing.listing_id, listing.subscription_id, e
                    );
                    summary.record(outcome);
                    summary.persist_errors += 1;
                }
            }
        }

        info!(
            "Dispatch finished: {} sent, {} failed, {} recipients removed, {} unresolved.",
            summary.sent, summary.failed, summary.recipients_removed, summary.unresolved
        );
        Ok(summary)
    }

    async fn dispatch(
        &self,
        listing: &Listing,
        removed_users: &mut HashSet<UserId>,
    ) -> Result<DispatchOutcome, (DispatchOutcome, RepositoryError)> {
        let subscription = match self
            .repository
            .get_subscription_by_id(&listing.subscription_id)
            .await
        {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(
                    "Skipping listing `{}`: cannot resolve subscription `{}`: {}",
                    listing.listing_id, listing.subscription_id, e
                );
                return Ok(DispatchOutcome::Unresolved);
            }
        };
        if removed_users.contains(&subscription.user_id) {
            return Ok(DispatchOutcome::Unresolved);
        }

        let sent = match self.renderer.render(listing) {
            Ok(text) => self.channel.send(subscription.user_id, &text).await,
            Err(e) => Err(DeliveryError::Transient {
                reason: format!("failed to render message: {e}"),
            }),
        };

        match sent {
            Ok(()) => {
                debug!(
                    "Sent listing `{}` to user {}",
                    listing.listing_id, subscription.user_id
                );
                let record = self
                    .repository
                    .record_notification(NotificationRecord::sent(listing))
                    .await;
                let update = self.repository.mark_delivered(listing).await.map(|promoted| {
                    if !promoted {
                        info!(
                            "Listing `{}` changed while being sent. Leaving it pending.",
                            listing.listing_id
                        );
                    }
                });
                record
                    .and(update)
                    .map(|_| DispatchOutcome::Sent)
                    .map_err(|e| (DispatchOutcome::Sent, e))
            }
            Err(DeliveryError::RecipientGone { user_id }) => {
                info!(
                    "User {} is unreachable. Removing their subscriptions and listings.",
                    user_id
                );
                removed_users.insert(subscription.user_id);
                self.repository
                    .delete_subscriptions_and_listings_for_user(subscription.user_id)
                    .await
                    .map(|_| DispatchOutcome::RecipientGone)
                    .map_err(|e| (DispatchOutcome::RecipientGone, e))
            }
            Err(DeliveryError::Transient { reason }) => {
                warn!(
                    "Failed to send listing `{}` to user {}: {}",
                    listing.listing_id, subscription.user_id, reason
                );
                let record = self
                    .repository
                    .record_notification(NotificationRecord::failed(listing, reason))
                    .await;
                let update = self
                    .repository
                    .touch_listing(&listing.subscription_id, &listing.listing_id)
                    .await;
                record
                    .and(update)
                    .map(|_| DispatchOutcome::Failed)
                    .map_err(|e| (DispatchOutcome::Failed, e))
            }
        }
    }
}
