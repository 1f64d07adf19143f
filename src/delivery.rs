//! Push delivery of rendered listing notifications to users.

use async_trait::async_trait;

use crate::entity::UserId;

pub mod message;
pub mod telegram;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum DeliveryError {
    /// The recipient can no longer be reached (blocked the bot, deleted the chat).
    #[error("Recipient {user_id} is permanently unavailable.")]
    RecipientGone { user_id: UserId },

    #[error("Transient delivery failure: {reason}")]
    Transient { reason: String },
}

/// Single push-style messaging channel per user.
///
/// Implementations classify every failure into a [`DeliveryError`] variant so callers
/// never inspect error strings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn send(&self, user_id: UserId, message: &str) -> Result<(), DeliveryError>;
}
