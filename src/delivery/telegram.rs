//! Telegram Bot API delivery channel.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use log::info;
use serde_json::Value;
use wreq::header::CONTENT_TYPE;

use crate::delivery::DeliveryChannel;
use crate::delivery::DeliveryError;
use crate::entity::UserId;

const PARSE_MODE: &str = "MarkdownV2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const FORBIDDEN: u16 = 403;

pub struct TelegramChannel {
    endpoint: String,
    client: wreq::Client,
}

impl TelegramChannel {
    pub fn new(api_url: &str, token: &str) -> Result<Self, DeliveryError> {
        let client = wreq::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DeliveryError::Transient {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        info!("Initializing TelegramChannel.");

        Ok(Self {
            endpoint: format!("{}/bot{}/sendMessage", api_url.trim_end_matches('/'), token),
            client,
        })
    }

    fn classify(user_id: UserId, status: u16, body: &str) -> Result<(), DeliveryError> {
        let json: Option<Value> = serde_json::from_str(body).ok();
        let ok = json
            .as_ref()
            .and_then(|j| j.get("ok"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if (200..300).contains(&status) && ok {
            return Ok(());
        }

        let error_code = json
            .as_ref()
            .and_then(|j| j.get("error_code"))
            .and_then(Value::as_u64);
        if status == FORBIDDEN || error_code == Some(u64::from(FORBIDDEN)) {
            return Err(DeliveryError::RecipientGone { user_id });
        }

        let description = json
            .as_ref()
            .and_then(|j| j.get("description"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Err(DeliveryError::Transient {
            reason: description.unwrap_or_else(|| format!("HTTP {status}")),
        })
    }
}

#[async_trait]
impl DeliveryChannel for TelegramChannel {
    async fn send(&self, user_id: UserId, message: &str) -> Result<(), DeliveryError> {
        let payload = serde_json::json!({
            "chat_id": user_id,
            "text": message,
            "parse_mode": PARSE_MODE,
        });

        debug!("Sending message to chat {}", user_id);
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_string())
            .send()
            .await
            .map_err(|e| DeliveryError::Transient {
                reason: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| DeliveryError::Transient {
            reason: e.to_string(),
        })?;

        Self::classify(user_id, status, &body)
    }
}
