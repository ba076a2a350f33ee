//! chama-server: real-time chat and notification server for chama groups.

use chama_core::{ChamaResult, GroupId, UserId};
use chama_server::config::{SeedSection, ServerConfig};
use chama_server::presence::InMemoryRegistry;
use chama_server::store::{
    MembershipDirectory, MemoryStore, MessageStore, SqliteStore, UserDirectory,
};
use chama_server::ChamaServer;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// chama-server: chama real-time messaging server
#[derive(Parser, Debug)]
#[command(name = "chama-server", version, about = "Chama real-time messaging server")]
struct Cli {
    /// Bind address
    #[arg(long)]
    bind: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file path
    #[arg(long, default_value = "~/.chama/server.toml")]
    config: String,

    /// SQLite database URL (e.g. sqlite://chama.db); in-memory store if unset
    #[arg(long)]
    database_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

struct Stores {
    users: Arc<dyn UserDirectory>,
    members: Arc<dyn MembershipDirectory>,
    messages: Arc<dyn MessageStore>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting chama-server");

    let config_path = PathBuf::from(&cli.config);
    let config = match ServerConfig::load(
        Some(config_path.as_path()),
        cli.bind.as_deref(),
        cli.port,
        cli.database_url.as_deref(),
    ) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let stores = match open_stores(&config).await {
        Ok(stores) => stores,
        Err(e) => {
            error!(error = %e, "failed to open store");
            std::process::exit(1);
        }
    };

    let server = ChamaServer::new(
        config,
        Arc::new(InMemoryRegistry::new()),
        stores.users,
        stores.members,
        stores.messages,
    );

    if let Err(e) = server.run(shutdown_signal()).await {
        error!(error = %e, "server error");
        std::process::exit(1);
    }
}

/// Open the configured store and load seed data into it.
async fn open_stores(config: &ServerConfig) -> ChamaResult<Stores> {
    match &config.database_url {
        Some(url) => {
            info!(url = %url, "using SQLite store");
            let store = Arc::new(SqliteStore::connect(url).await?);
            for user in &config.seed.users {
                store.upsert_user(UserId(user.id), &user.display_name).await?;
            }
            for group in &config.seed.groups {
                for member in &group.members {
                    store.add_member(GroupId(group.id), UserId(*member)).await?;
                }
            }
            log_seed(&config.seed);
            Ok(Stores {
                users: store.clone(),
                members: store.clone(),
                messages: store,
            })
        }
        None => {
            info!("using in-memory store, messages will not survive a restart");
            let store = Arc::new(MemoryStore::new());
            for user in &config.seed.users {
                store.add_user(UserId(user.id), user.display_name.clone()).await;
            }
            for group in &config.seed.groups {
                for member in &group.members {
                    store.add_member(GroupId(group.id), UserId(*member)).await;
                }
            }
            log_seed(&config.seed);
            Ok(Stores {
                users: store.clone(),
                members: store.clone(),
                messages: store,
            })
        }
    }
}

fn log_seed(seed: &SeedSection) {
    if !seed.users.is_empty() || !seed.groups.is_empty() {
        info!(users = seed.users.len(), groups = seed.groups.len(), "seed data loaded");
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    info!("received shutdown signal");
}
