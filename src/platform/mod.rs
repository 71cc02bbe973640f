pub mod telegram;

#[cfg(test)]
pub mod fake;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::types::Message;

/// A message received from the platform, reduced to what the bot acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub message_id: i32,
    /// None for channel posts and other messages without a user sender
    pub sender_id: Option<i64>,
    pub text: Option<String>,
    pub has_photo: bool,
}

impl From<&Message> for IncomingMessage {
    fn from(msg: &Message) -> Self {
        Self {
            chat_id: msg.chat.id.0,
            message_id: msg.id.0,
            sender_id: msg.from.as_ref().map(|user| user.id.0 as i64),
            text: msg.text().map(str::to_string),
            has_photo: msg.photo().is_some(),
        }
    }
}

/// Webhook registration as reported by the platform
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookStatus {
    pub url: Option<String>,
    pub pending_update_count: u32,
    pub last_error_message: Option<String>,
    pub last_error_date: Option<DateTime<Utc>>,
}

/// Outbound calls to the messaging platform
#[async_trait]
pub trait Platform: Send + Sync {
    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<()>;

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;

    async fn webhook_info(&self) -> Result<WebhookStatus>;

    async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> Result<()>;

    async fn delete_webhook(&self) -> Result<()>;

    /// The bot's own @username, if it has one
    async fn bot_username(&self) -> Result<Option<String>>;
}
