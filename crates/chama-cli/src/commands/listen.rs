//! `chama listen`: print every envelope pushed to this user.

use anyhow::Result;
use chama_core::UserId;
use tracing::debug;

use super::{connect, render};

pub async fn run(url: &str, user: UserId) -> Result<()> {
    let mut client = connect(url, user).await?;
    eprintln!("listening as user {user} on {url} (Ctrl+C to stop)");

    loop {
        tokio::select! {
            envelope = client.recv() => match envelope {
                Some(envelope) => println!("{}", render(&envelope)),
                None => {
                    eprintln!("connection closed by server");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                break;
            }
        }
    }

    client.close().await.ok();
    Ok(())
}
