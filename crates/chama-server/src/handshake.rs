//! Per-connection presence: the auth handshake state machine.
//!
//! A connection starts unauthenticated. A well-formed `auth` envelope binds
//! it to a user in the registry; closing releases that binding if it is
//! still ours.

use crate::presence::{ConnectionHandle, ConnectionRegistry};
use chama_core::UserId;
use std::sync::Arc;
use tracing::{debug, info};

/// Handshake state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unauthenticated,
    Authenticated(UserId),
}

/// Owns the handshake state, the connection handle and the registry binding.
pub struct Presence {
    state: ConnectionState,
    conn: ConnectionHandle,
    registry: Arc<dyn ConnectionRegistry>,
}

impl Presence {
    pub fn new(conn: ConnectionHandle, registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self {
            state: ConnectionState::Unauthenticated,
            conn,
            registry,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The authenticated user, if any.
    pub fn user_id(&self) -> Option<UserId> {
        match self.state {
            ConnectionState::Authenticated(user) => Some(user),
            ConnectionState::Unauthenticated => None,
        }
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.conn
    }

    /// Bind this connection to `user`.
    ///
    /// Repeating the same id re-registers the same binding. A different id
    /// first releases the old binding.
    pub fn authenticate(&mut self, user: UserId) {
        let conn_id = self.conn.id();
        if let ConnectionState::Authenticated(previous) = self.state {
            if previous != user {
                info!(conn_id = %conn_id, from = %previous, to = %user, "connection switched user");
                self.registry.unregister(previous, conn_id);
            }
        }

        self.registry.register(user, self.conn.clone());
        self.state = ConnectionState::Authenticated(user);
        debug!(conn_id = %conn_id, user_id = %user, "authenticated");
    }

    /// Release the registry binding. Safe to call more than once.
    pub fn close(&mut self) {
        if let ConnectionState::Authenticated(user) = self.state {
            self.registry.unregister(user, self.conn.id());
        }
        self.state = ConnectionState::Unauthenticated;
    }
}
