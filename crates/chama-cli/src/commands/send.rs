//! `chama send`: send one chat message and report the outcome.
//!
//! Direct messages are confirmed by the server echoing them back. Group
//! messages have no acknowledgement, so a short quiet period with no error
//! counts as success.

use anyhow::{bail, Result};
use chama_client::ChatClient;
use chama_core::{ChatTarget, Outbound, UserId};
use std::time::Duration;
use tokio::time::timeout;

use super::{connect, render};

const DIRECT_ECHO_TIMEOUT: Duration = Duration::from_secs(5);
const GROUP_QUIET_PERIOD: Duration = Duration::from_secs(1);

pub async fn run(url: &str, user: UserId, target: ChatTarget, content: &str) -> Result<()> {
    let mut client = connect(url, user).await?;
    match target {
        ChatTarget::Direct(to) => client.send_direct(to, content).await?,
        ChatTarget::Group(group) => client.send_group(group, content).await?,
    }

    let outcome = wait_for_outcome(&mut client, user, target, content).await;
    client.close().await.ok();
    outcome
}

async fn wait_for_outcome(
    client: &mut ChatClient,
    user: UserId,
    target: ChatTarget,
    content: &str,
) -> Result<()> {
    let wait = match target {
        ChatTarget::Direct(_) => DIRECT_ECHO_TIMEOUT,
        ChatTarget::Group(_) => GROUP_QUIET_PERIOD,
    };

    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let envelope = match timeout(remaining, client.recv()).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => bail!("connection closed before the message was confirmed"),
            Err(_) => match target {
                ChatTarget::Direct(_) => bail!("no echo from server within {wait:?}"),
                ChatTarget::Group(group) => {
                    println!("sent to #{group}");
                    return Ok(());
                }
            },
        };

        match &envelope {
            Outbound::Error { message } => bail!("server rejected message: {message}"),
            Outbound::Chat(chat) if chat.sender_id == user && chat.content == content => {
                println!("{}", render(&envelope));
                return Ok(());
            }
            _ => println!("{}", render(&envelope)),
        }
    }
}
