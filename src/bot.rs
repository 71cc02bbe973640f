use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use teloxide::types::{Update, UpdateKind};
use tracing::{debug, error, info, warn};

use crate::commands::{handle_command, Command};
use crate::config::Config;
use crate::notifier::Notifier;
use crate::platform::{IncomingMessage, Platform};
use crate::store::UserStore;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub platform: Arc<dyn Platform>,
    pub users: UserStore,
    pub notifier: Notifier,
    pub started_at: Instant,
    /// Used to tell our commands from ones addressed to other bots
    pub bot_username: Option<String>,
}

impl AppState {
    pub fn new(config: Config, platform: Arc<dyn Platform>, users: UserStore) -> Self {
        let notifier = Notifier::new(platform.clone(), config.telegram.admin_id);
        Self {
            config,
            platform,
            users,
            notifier,
            started_at: Instant::now(),
            bot_username: None,
        }
    }

    pub fn with_bot_username(mut self, username: Option<String>) -> Self {
        self.bot_username = username;
        self
    }

    /// The single gate in front of every command handler
    pub fn is_admin(&self, msg: &IncomingMessage) -> bool {
        msg.sender_id == Some(self.config.telegram.admin_id)
    }
}

/// Decode a raw webhook payload and route it. Non-message updates are ignored.
pub async fn dispatch_raw(state: &AppState, body: &[u8]) -> Result<()> {
    let update: Update = serde_json::from_slice(body).context("Failed to decode update")?;

    match update.kind {
        UpdateKind::Message(ref msg) => {
            dispatch(state, &IncomingMessage::from(msg)).await;
        }
        _ => debug!("Ignoring non-message update {}", update.id.0),
    }
    Ok(())
}

/// Commands go to the admin handlers; everything else to the content filter.
pub async fn dispatch(state: &AppState, msg: &IncomingMessage) {
    let username = state.bot_username.as_deref();
    if let Some(command) = msg.text.as_deref().and_then(|text| Command::parse(text, username)) {
        if state.is_admin(msg) {
            handle_command(state, msg, command).await;
        }
        return;
    }

    filter_photo(state, msg).await;
}

/// Delete photos sent by blocked users. Failures are logged, never raised.
async fn filter_photo(state: &AppState, msg: &IncomingMessage) {
    if !msg.has_photo {
        return;
    }
    let Some(user_id) = msg.sender_id else {
        return;
    };
    if !state.users.contains(user_id).await {
        return;
    }

    match state.platform.delete_message(msg.chat_id, msg.message_id).await {
        Ok(()) => info!("Deleted photo | user={} | chat={}", user_id, msg.chat_id),
        Err(e) => error!("Delete failed: {:#}", e),
    }
}

/// Without a username, commands addressed to any @bot are accepted.
pub async fn fetch_bot_username(platform: &dyn Platform) -> Option<String> {
    match platform.bot_username().await {
        Ok(username) => {
            info!("Bot username: {:?}", username);
            username
        }
        Err(e) => {
            warn!("Could not fetch bot username: {:#}", e);
            None
        }
    }
}

/// Point the platform at our webhook. Failure is reported, not fatal.
pub async fn register_webhook(state: &AppState) {
    let url = state.config.webhook_url();
    let secret = state.config.server.webhook_secret.as_deref();
    if let Err(e) = state.platform.set_webhook(&url, secret).await {
        error!("Failed to register webhook: {:#}", e);
        state
            .notifier
            .notify(&format!("Failed to register webhook: {:#}", e))
            .await;
    }
}

/// Drop the registration on shutdown, unless this deployment keeps it.
pub async fn unregister_webhook(state: &AppState) {
    if !state.config.server.delete_webhook_on_shutdown {
        info!("Keeping webhook registered");
        return;
    }
    if let Err(e) = state.platform.delete_webhook().await {
        warn!("Failed to remove webhook on shutdown: {:#}", e);
    }
}

#[cfg(test)]
pub async fn test_state(dir: &std::path::Path, platform: Arc<dyn Platform>) -> AppState {
    let users_file = dir.join("users.json");
    let users = UserStore::open(&users_file).await.unwrap();
    AppState::new(crate::config::test_config(&users_file), platform, users)
        .with_bot_username(Some("guard_bot".to_string()))
}
