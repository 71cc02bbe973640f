use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::bot::{dispatch_raw, AppState};

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", post(webhook))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("0.0.0.0:{}", state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    Ok(())
}

/// Always answers 200: repeated webhook errors make the platform suspend delivery.
async fn webhook(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> StatusCode {
    if let Some(expected) = state.config.server.webhook_secret.as_deref() {
        let given = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(expected) {
            warn!("Dropping webhook request with a missing or wrong secret token");
            return StatusCode::OK;
        }
    }

    if let Err(e) = dispatch_raw(&state, &body).await {
        error!("Webhook error: {:#}", e);
        state.notifier.notify(&format!("Webhook error: {:#}", e)).await;
    }

    StatusCode::OK
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "blocked_users": state.users.len().await,
    }))
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::test_state;
    use crate::platform::fake::FakePlatform;
    use axum::http::HeaderValue;

    const ADMIN: i64 = 1000;

    fn command_body(text: &str) -> Bytes {
        Bytes::from(
            json!({
                "update_id": 1,
                "message": {
                    "message_id": 5,
                    "date": 1_700_000_000,
                    "chat": { "id": ADMIN, "type": "private", "first_name": "Admin" },
                    "from": { "id": ADMIN, "is_bot": false, "first_name": "Admin" },
                    "text": text
                }
            })
            .to_string(),
        )
    }

    #[tokio::test]
    async fn test_health_reports_count() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(test_state(dir.path(), Arc::new(FakePlatform::default())).await);
        state.users.add(1).await.unwrap();
        state.users.add(2).await.unwrap();

        let Json(body) = health(State(state)).await;

        assert_eq!(body, json!({ "status": "ok", "blocked_users": 2 }));
    }

    #[tokio::test]
    async fn test_webhook_dispatches_update() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakePlatform::default());
        let state = Arc::new(test_state(dir.path(), fake.clone()).await);

        let status = webhook(State(state.clone()), HeaderMap::new(), command_body("/add_user 9")).await;

        assert_eq!(status, StatusCode::OK);
        assert!(state.users.contains(9).await);
    }

    #[tokio::test]
    async fn test_webhook_always_ok_and_notifies_admin() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakePlatform::default());
        let state = Arc::new(test_state(dir.path(), fake.clone()).await);

        let status = webhook(State(state), HeaderMap::new(), Bytes::from_static(b"<html>")).await;

        assert_eq!(status, StatusCode::OK);
        let notes = fake.sent_to(ADMIN);
        assert_eq!(notes.len(), 1);
        assert!(notes[0].starts_with("Webhook error"));
    }

    #[tokio::test]
    async fn test_webhook_secret_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakePlatform::default());
        let mut state = test_state(dir.path(), fake.clone()).await;
        state.config.server.webhook_secret = Some("s3cret".to_string());
        let state = Arc::new(state);

        let mut wrong = HeaderMap::new();
        wrong.insert(SECRET_HEADER, HeaderValue::from_static("nope"));
        let status = webhook(State(state.clone()), wrong, command_body("/add_user 1")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!state.users.contains(1).await);

        let mut right = HeaderMap::new();
        right.insert(SECRET_HEADER, HeaderValue::from_static("s3cret"));
        webhook(State(state.clone()), right, command_body("/add_user 2")).await;
        assert!(state.users.contains(2).await);
    }
}
