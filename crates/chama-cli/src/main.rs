//! chama: command-line client for chama real-time messaging.
//!
//! Listens for chat and notification pushes, sends one-off direct or group
//! messages, or runs an interactive chat on stdin.

mod commands;
mod config;

use anyhow::{bail, Result};
use chama_core::{ChatTarget, GroupId, UserId};
use clap::{Parser, Subcommand};
use tracing::error;

/// chama: chama messaging client
#[derive(Parser)]
#[command(name = "chama", version, about = "Chama real-time messaging client")]
struct Cli {
    /// Server WebSocket URL (default from config, else ws://localhost:5000/ws)
    #[arg(long, global = true)]
    url: Option<String>,

    /// User id to authenticate as
    #[arg(short, long, global = true)]
    user: Option<i64>,

    /// Config file path
    #[arg(long = "config", global = true)]
    config: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print every chat and notification pushed to this user
    Listen,

    /// Send one message and wait for the outcome
    Send {
        /// Recipient user id
        #[arg(long, conflicts_with = "group", required_unless_present = "group")]
        to: Option<i64>,

        /// Chama (group) id
        #[arg(long)]
        group: Option<i64>,

        /// Message text
        #[arg(required = true, trailing_var_arg = true)]
        content: Vec<String>,
    },

    /// Interactive chat: `@<user> text` or `#<group> text`
    Chat,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing.
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("chama=debug,chama_cli=debug,chama_client=debug")
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("chama=warn,chama_cli=warn,chama_client=warn")
            .with_target(false)
            .init();
    }

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("chama: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Load config file.
    let config_path = cli.config.clone().unwrap_or_else(|| {
        let home = dirs::home_dir().unwrap_or_default();
        home.join(".chama").join("config.toml").to_string_lossy().to_string()
    });
    let cfg = config::Config::load(&config_path)?;

    // CLI overrides config.
    let url = cli.url.unwrap_or(cfg.default.url);
    let Some(user) = cli.user.or(cfg.default.user_id) else {
        bail!("no user id: pass --user or set default.user_id in {config_path}");
    };
    let user = UserId(user);
    if !user.is_valid() {
        bail!("user id must be positive");
    }

    match cli.command {
        Command::Listen => commands::listen::run(&url, user).await,
        Command::Send { to, group, content } => {
            let target = match (to, group) {
                (Some(to), None) => ChatTarget::Direct(UserId(to)),
                (None, Some(group)) => ChatTarget::Group(GroupId(group)),
                _ => bail!("exactly one of --to or --group is required"),
            };
            commands::send::run(&url, user, target, &content.join(" ")).await
        }
        Command::Chat => commands::chat::run(&url, user).await,
    }
}
