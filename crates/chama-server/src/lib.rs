//! chama-server: real-time messaging core for chama groups.
//!
//! Accepts WebSocket connections, binds each to an authenticated user,
//! routes direct and group chat through a message store, and pushes
//! notifications to whoever is connected.

pub mod config;
pub mod handshake;
pub mod presence;
pub mod routing;
pub mod server;
pub mod session;
pub mod store;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use config::ServerConfig;
pub use server::ChamaServer;
