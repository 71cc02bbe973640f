//! Recording stand-in for the Telegram client, used by unit tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Mutex;

use super::{Platform, WebhookStatus};

#[derive(Default)]
pub struct FakePlatform {
    pub sent: Mutex<Vec<(i64, String)>>,
    pub deleted: Mutex<Vec<(i64, i32)>>,
    pub webhook: Mutex<WebhookStatus>,
    pub webhooks_set: Mutex<Vec<(String, Option<String>)>>,
    pub webhook_deletions: Mutex<usize>,
    pub fail_delete: bool,
    pub fail_send: bool,
    pub fail_webhook_info: bool,
    pub username: Option<String>,
}

impl FakePlatform {
    pub fn with_webhook(url: Option<&str>) -> Self {
        let fake = Self::default();
        fake.webhook.lock().unwrap().url = url.map(str::to_string);
        fake
    }

    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: i64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(chat, _)| *chat == chat_id)
            .map(|(_, text)| text)
            .collect()
    }

    pub fn deleted(&self) -> Vec<(i64, i32)> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn webhooks_set(&self) -> Vec<(String, Option<String>)> {
        self.webhooks_set.lock().unwrap().clone()
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<()> {
        if self.fail_delete {
            bail!("Bad Request: message can't be deleted");
        }
        self.deleted.lock().unwrap().push((chat_id, message_id));
        Ok(())
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        if self.fail_send {
            bail!("Forbidden: bot was blocked by the user");
        }
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn webhook_info(&self) -> Result<WebhookStatus> {
        if self.fail_webhook_info {
            bail!("getWebhookInfo failed");
        }
        Ok(self.webhook.lock().unwrap().clone())
    }

    async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> Result<()> {
        self.webhooks_set
            .lock()
            .unwrap()
            .push((url.to_string(), secret_token.map(str::to_string)));
        self.webhook.lock().unwrap().url = Some(url.to_string());
        Ok(())
    }

    async fn delete_webhook(&self) -> Result<()> {
        *self.webhook_deletions.lock().unwrap() += 1;
        self.webhook.lock().unwrap().url = None;
        Ok(())
    }

    async fn bot_username(&self) -> Result<Option<String>> {
        Ok(self.username.clone())
    }
}
