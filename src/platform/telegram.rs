use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::payloads::SetWebhookSetters;
use teloxide::prelude::*;
use teloxide::types::MessageId;
use tracing::info;

use super::{Platform, WebhookStatus};

/// Telegram Bot API client
pub struct TelegramPlatform {
    bot: Bot,
}

impl TelegramPlatform {
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }
}

#[async_trait]
impl Platform for TelegramPlatform {
    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<()> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await
            .with_context(|| format!("deleteMessage failed for message {} in chat {}", message_id, chat_id))?;
        Ok(())
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .with_context(|| format!("sendMessage failed for chat {}", chat_id))?;
        Ok(())
    }

    async fn webhook_info(&self) -> Result<WebhookStatus> {
        let info = self
            .bot
            .get_webhook_info()
            .await
            .context("getWebhookInfo failed")?;

        Ok(WebhookStatus {
            url: info.url.map(|url| url.to_string()),
            pending_update_count: info.pending_update_count,
            last_error_message: info.last_error_message,
            last_error_date: info.last_error_date,
        })
    }

    async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> Result<()> {
        let parsed = reqwest::Url::parse(url)
            .with_context(|| format!("Invalid webhook URL: {}", url))?;

        let mut request = self.bot.set_webhook(parsed);
        if let Some(secret) = secret_token {
            request = request.secret_token(secret);
        }
        request.await.context("setWebhook failed")?;

        info!("Webhook set to {}", url);
        Ok(())
    }

    async fn delete_webhook(&self) -> Result<()> {
        self.bot
            .delete_webhook()
            .await
            .context("deleteWebhook failed")?;
        info!("Webhook removed");
        Ok(())
    }

    async fn bot_username(&self) -> Result<Option<String>> {
        let me = self.bot.get_me().await.context("getMe failed")?;
        Ok(me.user.username.clone())
    }
}
