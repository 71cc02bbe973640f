use tracing::{error, warn};

use crate::bot::AppState;
use crate::platform::IncomingMessage;

/// Admin commands understood by the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `None` when the argument is missing, extra, or not a user id
    AddUser(Option<i64>),
    RemoveUser(Option<i64>),
    ListUsers,
    Status { verbose: bool },
}

impl Command {
    /// Parse message text. Returns None for anything that is not one of our
    /// commands, so ordinary messages fall through to the content filter.
    ///
    /// A command addressed to another bot (`/status@other_bot`) is not ours.
    /// With no known username every addressee is accepted.
    pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let mut parts = text.split_whitespace();
        let head = parts.next()?.strip_prefix('/')?;
        // "/status@my_bot" is how commands look in groups
        let (name, addressee) = match head.split_once('@') {
            Some((name, addressee)) => (name, Some(addressee)),
            None => (head, None),
        };
        if let (Some(addressee), Some(me)) = (addressee, bot_username) {
            if !addressee.eq_ignore_ascii_case(me) {
                return None;
            }
        }
        let args: Vec<&str> = parts.collect();

        match name {
            "add_user" => Some(Command::AddUser(single_user_id(&args))),
            "remove_user" => Some(Command::RemoveUser(single_user_id(&args))),
            "list_users" => Some(Command::ListUsers),
            "status" => Some(Command::Status {
                verbose: args.iter().any(|a| a.eq_ignore_ascii_case("verbose")),
            }),
            _ => None,
        }
    }
}

fn single_user_id(args: &[&str]) -> Option<i64> {
    match args {
        [id] => id.parse().ok(),
        _ => None,
    }
}

/// Run a command already cleared by the admin check
pub async fn handle_command(state: &AppState, msg: &IncomingMessage, command: Command) {
    let text = match command {
        Command::AddUser(None) => "Usage: /add_user USER_ID".to_string(),
        Command::RemoveUser(None) => "Usage: /remove_user USER_ID".to_string(),
        Command::AddUser(Some(user_id)) => match state.users.add(user_id).await {
            Ok(_) => format!("User {} added", user_id),
            Err(e) => {
                error!("Failed to persist blocklist after adding {}: {:#}", user_id, e);
                format!("User {} added, but saving the list failed: {}", user_id, e)
            }
        },
        Command::RemoveUser(Some(user_id)) => match state.users.remove(user_id).await {
            Ok(_) => format!("User {} removed", user_id),
            Err(e) => {
                error!("Failed to persist blocklist after removing {}: {:#}", user_id, e);
                format!("User {} removed, but saving the list failed: {}", user_id, e)
            }
        },
        Command::ListUsers => list_text(&state.users.list().await),
        Command::Status { verbose } => status_text(state, verbose).await,
    };

    reply(state, msg.chat_id, &text).await;
}

async fn reply(state: &AppState, chat_id: i64, text: &str) {
    if let Err(e) = state.platform.send_message(chat_id, text).await {
        warn!("Failed to reply in chat {}: {:#}", chat_id, e);
    }
}

fn list_text(users: &[i64]) -> String {
    if users.is_empty() {
        return "The list is empty".to_string();
    }
    let ids: Vec<String> = users.iter().map(i64::to_string).collect();
    format!("Blocked users:\n{}", ids.join("\n"))
}

async fn status_text(state: &AppState, verbose: bool) -> String {
    let uptime = state.started_at.elapsed().as_secs();
    let blocked = state.users.len().await;

    let mut text = String::from("Bot status\n\nAlive: yes\n");

    let webhook = match state.platform.webhook_info().await {
        Ok(info) => Some(info),
        Err(e) => {
            warn!("Could not fetch webhook info for status: {:#}", e);
            None
        }
    };

    match &webhook {
        Some(info) => {
            text.push_str(&format!(
                "Webhook URL:\n{}\n\nPending updates: {}\n",
                info.url.as_deref().unwrap_or("not set"),
                info.pending_update_count
            ));
        }
        None => text.push_str("Webhook URL:\nunavailable\n\nPending updates: unavailable\n"),
    }

    text.push_str(&format!("Blocked users: {}\nUptime: {}s\n", blocked, uptime));

    if verbose {
        let log_file = state
            .config
            .logging
            .file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdout only".to_string());
        text.push_str(&format!(
            "\nVerbose info\nVersion: {} {}\nPlatform: {} ({})\nUsers file: {}\nLog file: {}\n",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
            std::env::consts::ARCH,
            state.users.path().display(),
            log_file
        ));
    }

    if let Some(message) = webhook.as_ref().and_then(|info| info.last_error_message.as_deref()) {
        text.push_str("\nLast error:\n");
        text.push_str(message);
        if let Some(date) = webhook.as_ref().and_then(|info| info.last_error_date) {
            text.push_str(&format!(" ({})", date.format("%Y-%m-%d %H:%M:%S UTC")));
        }
    }

    text
}
