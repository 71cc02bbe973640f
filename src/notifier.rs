use std::sync::Arc;

use tracing::warn;

use crate::platform::Platform;

/// Best-effort messages to the admin. Failures are logged and dropped.
#[derive(Clone)]
pub struct Notifier {
    platform: Arc<dyn Platform>,
    admin_id: i64,
}

impl Notifier {
    pub fn new(platform: Arc<dyn Platform>, admin_id: i64) -> Self {
        Self { platform, admin_id }
    }

    pub async fn notify(&self, text: &str) {
        if let Err(e) = self.platform.send_message(self.admin_id, text).await {
            warn!("Failed to notify admin {}: {:#}", self.admin_id, e);
        }
    }
}
