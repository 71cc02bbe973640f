//! Keep-alive loop for hosts that sleep idle services.
//!
//! Every cycle pings our own public health URL and makes sure the webhook is
//! still registered, re-registering it when the platform reports none. There
//! is no backoff: a failing cycle is simply tried again on the next tick.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bot::AppState;

pub struct Wakeup {
    state: Arc<AppState>,
    client: reqwest::Client,
    health_url: String,
    webhook_url: String,
}

impl Wakeup {
    pub fn new(state: Arc<AppState>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(state.config.wakeup.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;
        let health_url = state.config.health_url();
        let webhook_url = state.config.webhook_url();
        Ok(Self {
            state,
            client,
            health_url,
            webhook_url,
        })
    }

    /// One pass: self ping, then the webhook presence check.
    pub async fn run_cycle(&self) {
        self.ping_self().await;
        self.ensure_webhook().await;
    }

    async fn ping_self(&self) {
        match self.client.get(&self.health_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let blocked = resp
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|body| body.get("blocked_users").and_then(|v| v.as_u64()));
                info!("Self-ping ok (blocked_users={:?})", blocked);
            }
            Ok(resp) => {
                warn!("Self-ping returned {}", resp.status());
                self.state
                    .notifier
                    .notify(&format!("Self-ping returned {}", resp.status()))
                    .await;
            }
            Err(e) => {
                warn!("Self-ping failed: {}", e);
                self.state
                    .notifier
                    .notify(&format!("Self-ping failed: {}", e))
                    .await;
            }
        }
    }

    async fn ensure_webhook(&self) {
        let info = match self.state.platform.webhook_info().await {
            Ok(info) => info,
            Err(e) => {
                warn!("Webhook check failed: {:#}", e);
                self.state
                    .notifier
                    .notify(&format!("Webhook check failed: {:#}", e))
                    .await;
                return;
            }
        };

        if info.url.as_deref().is_some_and(|url| !url.is_empty()) {
            return;
        }

        warn!("Webhook is not set, registering {}", self.webhook_url);
        let secret = self.state.config.server.webhook_secret.as_deref();
        match self.state.platform.set_webhook(&self.webhook_url, secret).await {
            Ok(()) => {
                self.state
                    .notifier
                    .notify(&format!("Webhook was missing and has been restored: {}", self.webhook_url))
                    .await;
            }
            Err(e) => {
                warn!("Failed to restore webhook: {:#}", e);
                self.state
                    .notifier
                    .notify(&format!("Failed to restore webhook: {:#}", e))
                    .await;
            }
        }
    }
}

/// Stops the loop when told to, or when dropped.
pub struct WakeupHandle {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl WakeupHandle {
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        if let Err(e) = self.task.await {
            warn!("Wakeup task ended abnormally: {}", e);
        }
        info!("Wakeup loop stopped");
    }
}

/// Run `wakeup` after `initial_delay`, then every `interval`, until stopped.
pub fn spawn(wakeup: Wakeup, initial_delay: Duration, interval: Duration) -> WakeupHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        info!(
            "Wakeup loop starting in {:?}, every {:?}",
            initial_delay, interval
        );
        let mut delay = initial_delay;
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = tokio::time::sleep(delay) => {}
            }
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = wakeup.run_cycle() => {}
            }
            delay = interval;
        }
    });

    WakeupHandle { stop_tx, task }
}
