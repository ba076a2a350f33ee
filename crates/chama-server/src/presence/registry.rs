//! Connection registry: which users are reachable right now, and how.
//!
//! At most one live connection per user. A new registration replaces the
//! previous one; the replaced connection is not closed here. Removal is
//! guarded by connection id so that a late close from a replaced
//! connection cannot evict its successor.

use super::connection::{ConnectionHandle, ConnectionId};
use chama_core::UserId;
use dashmap::DashMap;
use tracing::{debug, info};

/// Shared user → connection map. Every operation is atomic per user.
pub trait ConnectionRegistry: Send + Sync {
    /// Bind `user` to `conn`, returning the connection it replaced, if any.
    fn register(&self, user: UserId, conn: ConnectionHandle) -> Option<ConnectionHandle>;

    /// Current connection for `user`.
    fn lookup(&self, user: UserId) -> Option<ConnectionHandle>;

    /// Remove the binding for `user` only if it still points at `conn`.
    /// Returns whether an entry was removed.
    fn unregister(&self, user: UserId, conn: ConnectionId) -> bool;

    /// Number of users currently reachable.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of reachable users, in no particular order.
    fn connected_users(&self) -> Vec<UserId>;
}

/// In-process registry on a sharded concurrent map.
#[derive(Default)]
pub struct InMemoryRegistry {
    entries: DashMap<UserId, ConnectionHandle>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConnectionRegistry for InMemoryRegistry {
    fn register(&self, user: UserId, conn: ConnectionHandle) -> Option<ConnectionHandle> {
        let conn_id = conn.id();
        let previous = self.entries.insert(user, conn);
        match &previous {
            Some(old) if old.id() != conn_id => {
                info!(user_id = %user, conn_id = %conn_id, replaced = %old.id(), "user re-registered, previous connection orphaned");
            }
            Some(_) => {
                debug!(user_id = %user, conn_id = %conn_id, "registration refreshed");
            }
            None => {
                info!(user_id = %user, conn_id = %conn_id, "user registered");
            }
        }
        previous
    }

    fn lookup(&self, user: UserId) -> Option<ConnectionHandle> {
        self.entries.get(&user).map(|entry| entry.value().clone())
    }

    fn unregister(&self, user: UserId, conn: ConnectionId) -> bool {
        let removed = self
            .entries
            .remove_if(&user, |_, current| current.id() == conn)
            .is_some();
        if removed {
            info!(user_id = %user, conn_id = %conn, "user unregistered");
        } else {
            debug!(user_id = %user, conn_id = %conn, "stale unregister ignored");
        }
        removed
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn connected_users(&self) -> Vec<UserId> {
        self.entries.iter().map(|entry| *entry.key()).collect()
    }
}
