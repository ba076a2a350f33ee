//! CLI subcommand implementations.

pub mod chat;
pub mod listen;
pub mod send;

use anyhow::{Context, Result};
use chama_client::ChatClient;
use chama_core::{Outbound, UserId};
use tracing::info;

/// Connect to `url` and authenticate as `user`.
pub async fn connect(url: &str, user: UserId) -> Result<ChatClient> {
    let client = ChatClient::connect(url)
        .await
        .with_context(|| format!("failed to connect to {url}"))?;
    client
        .authenticate(user)
        .await
        .context("failed to send auth")?;
    info!(url = %url, user_id = %user, "authenticated");
    Ok(client)
}

/// One-line human rendering of a server envelope.
pub fn render(envelope: &Outbound) -> String {
    match envelope {
        Outbound::Chat(chat) => {
            let time = chat.sent_at.format("%H:%M:%S");
            let target = match (chat.group_id, chat.recipient_user_id) {
                (Some(group), _) => format!("#{group}"),
                (None, Some(user)) => format!("@{user}"),
                (None, None) => String::new(),
            };
            format!(
                "[{time}] {} ({}) -> {target}: {}",
                chat.sender_display_name, chat.sender_id, chat.content
            )
        }
        Outbound::Notification(n) => {
            format!("[{}] {}: {}", n.notification_type, n.title, n.content)
        }
        Outbound::Error { message } => format!("error: {message}"),
    }
}
