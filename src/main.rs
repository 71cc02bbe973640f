mod bot;
mod commands;
mod config;
mod notifier;
mod platform;
mod server;
mod store;
mod wakeup;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::config::{Config, LoggingConfig};
use crate::platform::telegram::TelegramPlatform;
use crate::platform::Platform;
use crate::store::UserStore;
use crate::wakeup::Wakeup;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref()).context("Failed to load configuration")?;

    init_logging(&config.logging)?;

    info!("Configuration loaded successfully");
    info!("  Admin: {}", config.telegram.admin_id);
    info!("  Webhook: {}", config.webhook_url());
    info!("  Port: {}", config.server.port);
    info!("  Users file: {}", config.storage.users_file.display());
    info!("  Wakeup loop: {}", if config.wakeup.enabled { "on" } else { "off" });

    let users = UserStore::open(config.storage.users_file.clone()).await?;
    let platform: Arc<dyn Platform> = Arc::new(TelegramPlatform::new(&config.telegram.bot_token));
    let bot_username = bot::fetch_bot_username(platform.as_ref()).await;
    let state = Arc::new(AppState::new(config, platform, users).with_bot_username(bot_username));

    // The server still starts so the wakeup loop can retry the registration.
    bot::register_webhook(&state).await;

    let wakeup = if state.config.wakeup.enabled {
        let wakeup_config = &state.config.wakeup;
        Some(wakeup::spawn(
            Wakeup::new(state.clone())?,
            wakeup_config.initial_delay(),
            wakeup_config.interval(),
        ))
    } else {
        None
    };

    info!("Bot is starting...");
    let served = server::serve(state.clone(), server::shutdown_signal()).await;

    if let Some(handle) = wakeup {
        handle.stop().await;
    }

    bot::unregister_webhook(&state).await;

    served
}

/// Stdout always; the configured log file as well when there is one.
fn init_logging(config: &LoggingConfig) -> Result<()> {
    let file_layer = match &config.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,photo_guard=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(())
}
