//! In-memory store: users, chama memberships and messages in process maps.
//!
//! Used when no database is configured and as the default collaborator in
//! tests. Nothing survives a restart.

use super::{
    MembershipDirectory, MessageStore, NewMessage, StoredMessage, UserDirectory, UserProfile,
};
use async_trait::async_trait;
use chama_core::{ChamaResult, GroupId, MessageId, UserId};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, UserProfile>,
    members: HashMap<GroupId, BTreeSet<UserId>>,
    messages: Vec<StoredMessage>,
    next_message_id: i64,
}

/// Process-local implementation of every collaborator port.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or rename a user.
    pub async fn add_user(&self, id: UserId, display_name: impl Into<String>) {
        let profile = UserProfile {
            id,
            display_name: display_name.into(),
        };
        self.inner.write().await.users.insert(id, profile);
    }

    /// Add `user` to `group`. Adding an existing member is a no-op.
    pub async fn add_member(&self, group: GroupId, user: UserId) {
        self.inner
            .write()
            .await
            .members
            .entry(group)
            .or_default()
            .insert(user);
    }

    /// Number of persisted messages.
    pub async fn message_count(&self) -> usize {
        self.inner.read().await.messages.len()
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn get_user(&self, id: UserId) -> ChamaResult<Option<UserProfile>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }
}

#[async_trait]
impl MembershipDirectory for MemoryStore {
    async fn get_group_members(&self, group: GroupId) -> ChamaResult<Vec<UserId>> {
        let inner = self.inner.read().await;
        Ok(inner
            .members
            .get(&group)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create_message(&self, msg: NewMessage) -> ChamaResult<StoredMessage> {
        let mut inner = self.inner.write().await;
        inner.next_message_id += 1;

        // Keep timestamps monotonic alongside ids even if the clock steps back.
        let now = Utc::now();
        let sent_at = match inner.messages.last() {
            Some(prev) if prev.sent_at > now => prev.sent_at,
            _ => now,
        };

        let stored = StoredMessage {
            id: MessageId(inner.next_message_id),
            sender_id: msg.sender_id,
            recipient_user_id: msg.target.recipient_user_id(),
            group_id: msg.target.group_id(),
            content: msg.content,
            sent_at,
            read: false,
        };
        inner.messages.push(stored.clone());
        debug!(message_id = %stored.id, sender_id = %stored.sender_id, "message stored");
        Ok(stored)
    }

    async fn user_messages(&self, user: UserId) -> ChamaResult<Vec<StoredMessage>> {
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .iter()
            .filter(|m| m.sender_id == user || m.recipient_user_id == Some(user))
            .cloned()
            .collect())
    }

    async fn group_messages(&self, group: GroupId) -> ChamaResult<Vec<StoredMessage>> {
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .iter()
            .filter(|m| m.group_id == Some(group))
            .cloned()
            .collect())
    }

    async fn mark_read(&self, id: MessageId) -> ChamaResult<Option<StoredMessage>> {
        let mut inner = self.inner.write().await;
        Ok(inner.messages.iter_mut().find(|m| m.id == id).map(|m| {
            m.read = true;
            m.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chama_core::ChatTarget;

    fn direct(from: i64, to: i64, content: &str) -> NewMessage {
        NewMessage {
            sender_id: UserId(from),
            target: ChatTarget::Direct(UserId(to)),
            content: content.into(),
        }
    }

    #[tokio::test]
    async fn users_and_members_resolve() {
        let store = MemoryStore::new();
        store.add_user(UserId(1), "Akinyi Otieno").await;
        store.add_member(GroupId(10), UserId(1)).await;
        store.add_member(GroupId(10), UserId(2)).await;
        store.add_member(GroupId(10), UserId(1)).await;

        let user = store.get_user(UserId(1)).await.unwrap().unwrap();
        assert_eq!(user.display_name, "Akinyi Otieno");
        assert!(store.get_user(UserId(99)).await.unwrap().is_none());

        let members = store.get_group_members(GroupId(10)).await.unwrap();
        assert_eq!(members, vec![UserId(1), UserId(2)]);
        assert!(store.get_group_members(GroupId(11)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ids_increase_and_read_starts_false() {
        let store = MemoryStore::new();
        let a = store.create_message(direct(1, 2, "a")).await.unwrap();
        let b = store.create_message(direct(1, 2, "b")).await.unwrap();
        assert!(b.id > a.id);
        assert!(b.sent_at >= a.sent_at);
        assert!(!a.read);
        assert_eq!(a.recipient_user_id, Some(UserId(2)));
        assert_eq!(a.group_id, None);
        assert_eq!(store.message_count().await, 2);
    }

    #[tokio::test]
    async fn user_history_covers_sent_and_received() {
        let store = MemoryStore::new();
        store.create_message(direct(1, 2, "to two")).await.unwrap();
        store.create_message(direct(3, 1, "to one")).await.unwrap();
        store
            .create_message(NewMessage {
                sender_id: UserId(1),
                target: ChatTarget::Group(GroupId(5)),
                content: "to group".into(),
            })
            .await
            .unwrap();

        let mine = store.user_messages(UserId(1)).await.unwrap();
        let contents: Vec<_> = mine.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["to two", "to one", "to group"]);

        // Group posts are not "received" by members individually.
        let theirs = store.user_messages(UserId(3)).await.unwrap();
        assert_eq!(theirs.len(), 1);
        assert_eq!(theirs[0].content, "to one");

        let group = store.group_messages(GroupId(5)).await.unwrap();
        assert_eq!(group.len(), 1);
        assert_eq!(group[0].content, "to group");
    }

    #[tokio::test]
    async fn mark_read_flips_flag_once_found() {
        let store = MemoryStore::new();
        let msg = store.create_message(direct(1, 2, "x")).await.unwrap();

        let updated = store.mark_read(msg.id).await.unwrap().unwrap();
        assert!(updated.read);
        assert!(store.user_messages(UserId(2)).await.unwrap()[0].read);
        assert!(store.mark_read(MessageId(999)).await.unwrap().is_none());
    }
}
