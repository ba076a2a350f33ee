//! Presence: live connection handles and the user → connection registry.

pub mod connection;
pub mod registry;

pub use connection::{ChannelConnection, Connection, ConnectionHandle, ConnectionId};
pub use registry::{ConnectionRegistry, InMemoryRegistry};
