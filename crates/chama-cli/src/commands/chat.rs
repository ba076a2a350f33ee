//! `chama chat`: interactive chat on stdin/stdout.
//!
//! `@<user> text` sends a direct message, `#<group> text` a group message.
//! Inbound envelopes are printed as they arrive.

use anyhow::{bail, Context, Result};
use chama_core::{ChatTarget, GroupId, UserId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use super::{connect, render};

const USAGE: &str = "usage: @<user> message | #<group> message | /quit";

/// One parsed input line.
#[derive(Debug, PartialEq, Eq)]
pub enum InputLine {
    Send { target: ChatTarget, content: String },
    Quit,
    Empty,
}

/// Parse one line typed by the user.
pub fn parse_line(line: &str) -> Result<InputLine> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(InputLine::Empty);
    }
    if line == "/quit" {
        return Ok(InputLine::Quit);
    }

    let (head, content) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    let target = if let Some(id) = head.strip_prefix('@') {
        ChatTarget::Direct(UserId(parse_id(id, "user")?))
    } else if let Some(id) = head.strip_prefix('#') {
        ChatTarget::Group(GroupId(parse_id(id, "group")?))
    } else {
        bail!("{USAGE}");
    };

    if content.is_empty() {
        bail!("message is empty");
    }

    Ok(InputLine::Send {
        target,
        content: content.to_string(),
    })
}

fn parse_id(raw: &str, what: &str) -> Result<i64> {
    let id: i64 = raw
        .parse()
        .with_context(|| format!("invalid {what} id '{raw}'"))?;
    if id <= 0 {
        bail!("{what} id must be positive");
    }
    Ok(id)
}

pub async fn run(url: &str, user: UserId) -> Result<()> {
    let mut client = connect(url, user).await?;
    eprintln!("chatting as user {user} on {url}");
    eprintln!("{USAGE}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            envelope = client.recv() => match envelope {
                Some(envelope) => println!("{}", render(&envelope)),
                None => {
                    eprintln!("connection closed by server");
                    break;
                }
            },
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match parse_line(&line) {
                    Ok(InputLine::Send { target, content }) => {
                        let sent = match target {
                            ChatTarget::Direct(to) => client.send_direct(to, &content).await,
                            ChatTarget::Group(group) => client.send_group(group, &content).await,
                        };
                        if let Err(e) = sent {
                            warn!(error = %e, "send failed");
                            eprintln!("send failed: {e}");
                            break;
                        }
                    }
                    Ok(InputLine::Quit) => break,
                    Ok(InputLine::Empty) => {}
                    Err(e) => eprintln!("{e:#}"),
                }
            }
        }
    }

    client.close().await.ok();
    Ok(())
}
