//! Collaborator ports consumed by the router, and their adapters.
//!
//! The router only needs three capabilities: resolve a user's display
//! identity, list a group's members, and persist one message. Both adapters
//! implement all three on one struct so a single store can back the server.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chama_core::{ChamaResult, ChatTarget, GroupId, MessageId, UserId};
use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Display identity of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: String,
}

/// A chat message accepted by the router, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub target: ChatTarget,
    pub content: String,
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    pub recipient_user_id: Option<UserId>,
    pub group_id: Option<GroupId>,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub read: bool,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, id: UserId) -> ChamaResult<Option<UserProfile>>;
}

#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    /// Every member of `group`. Unknown groups have no members.
    async fn get_group_members(&self, group: GroupId) -> ChamaResult<Vec<UserId>>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist one message. Ids are strictly increasing; `read` starts false.
    async fn create_message(&self, msg: NewMessage) -> ChamaResult<StoredMessage>;

    /// Messages sent by `user` (direct or group) or addressed to `user`,
    /// oldest first.
    async fn user_messages(&self, user: UserId) -> ChamaResult<Vec<StoredMessage>>;

    /// Messages posted to `group`, oldest first.
    async fn group_messages(&self, group: GroupId) -> ChamaResult<Vec<StoredMessage>>;

    /// Set the read flag. `None` if no such message exists.
    async fn mark_read(&self, id: MessageId) -> ChamaResult<Option<StoredMessage>>;
}
