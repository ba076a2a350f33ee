//! Chat routing: validate, persist once, then fan out best-effort.

use crate::presence::{ConnectionHandle, ConnectionRegistry};
use crate::store::{MembershipDirectory, MessageStore, NewMessage, UserDirectory};
use chama_core::{
    encode_outbound, ChamaError, ChamaResult, ChatDelivery, ChatRequest, ChatTarget, MessageId,
    Outbound, UserId,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one routed chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub message_id: MessageId,
    /// Pushes that reached a connection queue.
    pub delivered: usize,
    /// Intended recipients with no registered connection.
    pub offline: usize,
    /// Pushes that failed at the connection.
    pub failed: usize,
}

impl DeliveryReport {
    fn new(message_id: MessageId) -> Self {
        Self {
            message_id,
            delivered: 0,
            offline: 0,
            failed: 0,
        }
    }

    fn push(&mut self, conn: &ConnectionHandle, frame: &str, user: UserId) {
        match conn.send(frame) {
            Ok(()) => self.delivered += 1,
            Err(e) => {
                warn!(user_id = %user, conn_id = %conn.id(), error = %e, "chat push failed");
                self.failed += 1;
            }
        }
    }
}

/// Routes authenticated chat envelopes to their live recipients.
pub struct MessageRouter {
    registry: Arc<dyn ConnectionRegistry>,
    users: Arc<dyn UserDirectory>,
    members: Arc<dyn MembershipDirectory>,
    store: Arc<dyn MessageStore>,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        users: Arc<dyn UserDirectory>,
        members: Arc<dyn MembershipDirectory>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            registry,
            users,
            members,
            store,
        }
    }

    /// Route one chat request from `sender`, whose own connection is
    /// `sender_conn`.
    ///
    /// Validation and sender errors are returned before anything is
    /// persisted. Once the message is stored it is never rolled back: a
    /// failed group lookup is returned as an error with nothing pushed, and
    /// push failures only show up in the report.
    pub async fn route_chat(
        &self,
        sender: UserId,
        sender_conn: &ConnectionHandle,
        req: &ChatRequest,
    ) -> ChamaResult<DeliveryReport> {
        let (content, target) = req.validate()?;

        let profile = self
            .users
            .get_user(sender)
            .await?
            .ok_or(ChamaError::UserNotFound(sender.get()))?;

        let stored = self
            .store
            .create_message(NewMessage {
                sender_id: sender,
                target,
                content: content.to_owned(),
            })
            .await
            .inspect_err(|e| warn!(sender_id = %sender, error = %e, "failed to store message"))?;

        // The record stays even if recipients cannot be resolved.
        let group_members = match target {
            ChatTarget::Group(group) => {
                let members = self.members.get_group_members(group).await.map_err(|e| {
                    warn!(message_id = %stored.id, group_id = %group, error = %e, "group membership lookup failed, message stored but not delivered");
                    ChamaError::Other(format!("membership lookup for group {group} failed: {e}"))
                })?;
                Some(members)
            }
            ChatTarget::Direct(_) => None,
        };

        let frame = encode_outbound(&Outbound::Chat(ChatDelivery {
            message_id: stored.id,
            sender_id: sender,
            sender_display_name: profile.display_name,
            recipient_user_id: stored.recipient_user_id,
            group_id: stored.group_id,
            content: stored.content,
            sent_at: stored.sent_at,
        }))?;

        let mut report = DeliveryReport::new(stored.id);
        match target {
            ChatTarget::Direct(recipient) => {
                match self.registry.lookup(recipient) {
                    Some(conn) => report.push(&conn, &frame, recipient),
                    None => {
                        debug!(user_id = %recipient, message_id = %stored.id, "recipient offline");
                        report.offline += 1;
                    }
                }
                report.push(sender_conn, &frame, sender);
            }
            ChatTarget::Group(_) => {
                for member in group_members.unwrap_or_default() {
                    match self.registry.lookup(member) {
                        Some(conn) => report.push(&conn, &frame, member),
                        None => report.offline += 1,
                    }
                }
            }
        }

        debug!(
            message_id = %report.message_id,
            sender_id = %sender,
            delivered = report.delivered,
            offline = report.offline,
            failed = report.failed,
            "chat routed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::{Connection, InMemoryRegistry};
    use crate::store::MemoryStore;
    use crate::test_support::{
        FailingConnection, FailingMembership, FailingStore, RecordingConnection,
    };
    use chama_core::GroupId;

    struct Harness {
        registry: Arc<InMemoryRegistry>,
        store: Arc<MemoryStore>,
        router: MessageRouter,
    }

    async fn harness() -> Harness {
        let registry = Arc::new(InMemoryRegistry::new());
        let store = Arc::new(MemoryStore::new());
        for (id, name) in [
            (1, "Amina"),
            (2, "Baraka"),
            (3, "Chebet"),
            (4, "Duncan"),
            (5, "Esther"),
            (7, "Wanjiru"),
            (9, "Otieno"),
        ] {
            store.add_user(UserId(id), name).await;
        }
        let router = MessageRouter::new(
            registry.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        );
        Harness {
            registry,
            store,
            router,
        }
    }

    impl Harness {
        fn connect(&self, user: i64) -> (Arc<RecordingConnection>, ConnectionHandle) {
            let conn = RecordingConnection::new();
            let handle: ConnectionHandle = conn.clone();
            self.registry.register(UserId(user), handle.clone());
            (conn, handle)
        }
    }

    fn chat(outbound: &Outbound) -> &ChatDelivery {
        match outbound {
            Outbound::Chat(chat) => chat,
            other => panic!("expected chat, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn direct_message_reaches_recipient_and_echoes_to_sender() {
        let h = harness().await;
        let (a, a_handle) = h.connect(1);
        let (b, _) = h.connect(2);

        let report = h
            .router
            .route_chat(UserId(1), &a_handle, &ChatRequest::direct(UserId(2), "habari"))
            .await
            .unwrap();

        assert_eq!(report.delivered, 2);
        assert_eq!(a.count(), 1);
        assert_eq!(b.count(), 1);

        for conn in [&a, &b] {
            let out = conn.outbound();
            let delivery = chat(&out[0]);
            assert_eq!(delivery.content, "habari");
            assert_eq!(delivery.sender_id, UserId(1));
            assert_eq!(delivery.sender_display_name, "Amina");
        }
        assert_eq!(a.frames(), b.frames());
    }

    #[tokio::test]
    async fn offline_recipient_still_persists_and_echoes() {
        let h = harness().await;
        let (sender, sender_handle) = h.connect(7);
        let (bystander, _) = h.connect(3);

        let report = h
            .router
            .route_chat(UserId(7), &sender_handle, &ChatRequest::direct(UserId(9), "hi"))
            .await
            .unwrap();

        assert_eq!(report.offline, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(h.store.message_count().await, 1);
        assert_eq!(bystander.count(), 0);

        let out = sender.outbound();
        assert_eq!(out.len(), 1);
        let delivery = chat(&out[0]);
        assert_eq!(delivery.sender_id, UserId(7));
        assert_eq!(delivery.recipient_user_id, Some(UserId(9)));
        assert_eq!(delivery.group_id, None);
        assert_eq!(delivery.content, "hi");
    }

    #[tokio::test]
    async fn group_message_reaches_only_connected_members() {
        let h = harness().await;
        for member in 1..=5 {
            h.store.add_member(GroupId(40), UserId(member)).await;
        }
        let (m1, m1_handle) = h.connect(1);
        let (m3, _) = h.connect(3);
        let (m5, _) = h.connect(5);
        let (outsider, _) = h.connect(7);

        let report = h
            .router
            .route_chat(UserId(1), &m1_handle, &ChatRequest::group(GroupId(40), "mchango ni Ijumaa"))
            .await
            .unwrap();

        assert_eq!(report.delivered, 3);
        assert_eq!(report.offline, 2);
        assert_eq!(h.store.message_count().await, 1);
        // The sender is a member and gets exactly one copy.
        assert_eq!(m1.count(), 1);
        assert_eq!(m3.count(), 1);
        assert_eq!(m5.count(), 1);
        assert_eq!(outsider.count(), 0);
        assert_eq!(chat(&m3.outbound()[0]).group_id, Some(GroupId(40)));
    }

    #[tokio::test]
    async fn failed_push_does_not_stop_fan_out() {
        let h = harness().await;
        for member in 1..=3 {
            h.store.add_member(GroupId(8), UserId(member)).await;
        }
        let (m1, m1_handle) = h.connect(1);
        let broken = FailingConnection::new();
        h.registry.register(UserId(2), broken.clone());
        let (m3, _) = h.connect(3);

        let report = h
            .router
            .route_chat(UserId(1), &m1_handle, &ChatRequest::group(GroupId(8), "x"))
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 2);
        assert_eq!(broken.attempts(), 1);
        assert_eq!(m1.count(), 1);
        assert_eq!(m3.count(), 1);
        assert_eq!(h.store.message_count().await, 1);
    }

    #[tokio::test]
    async fn back_to_back_messages_keep_order() {
        let h = harness().await;
        let (_, a_handle) = h.connect(7);
        let (b, _) = h.connect(9);

        for content in ["first", "second", "third"] {
            h.router
                .route_chat(UserId(7), &a_handle, &ChatRequest::direct(UserId(9), content))
                .await
                .unwrap();
        }

        let received: Vec<_> = b.outbound().iter().map(|o| chat(o).clone()).collect();
        let contents: Vec<_> = received.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
        assert!(received.windows(2).all(|w| w[0].message_id < w[1].message_id));
        assert!(received.windows(2).all(|w| w[0].sent_at <= w[1].sent_at));

        let stored = h.store.user_messages(UserId(9)).await.unwrap();
        assert!(stored.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_before_persisting() {
        let h = harness().await;
        let (a, a_handle) = h.connect(1);
        let (b, _) = h.connect(2);

        let cases = [
            ChatRequest::direct(UserId(2), ""),
            ChatRequest {
                content: Some("x".into()),
                ..Default::default()
            },
            ChatRequest {
                content: Some("x".into()),
                recipient_user_id: Some(UserId(2)),
                group_id: Some(GroupId(1)),
            },
        ];
        for req in cases {
            let err = h.router.route_chat(UserId(1), &a_handle, &req).await.unwrap_err();
            assert!(matches!(err, ChamaError::InvalidMessage(_)), "{err:?}");
        }

        assert_eq!(h.store.message_count().await, 0);
        assert_eq!(a.count() + b.count(), 0);
    }

    #[tokio::test]
    async fn unknown_sender_is_rejected() {
        let h = harness().await;
        let (_, ghost_handle) = h.connect(404);

        let err = h
            .router
            .route_chat(UserId(404), &ghost_handle, &ChatRequest::direct(UserId(1), "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChamaError::UserNotFound(404)));
        assert_eq!(h.store.message_count().await, 0);
    }

    #[tokio::test]
    async fn store_failure_aborts_delivery() {
        let registry = Arc::new(InMemoryRegistry::new());
        let users = Arc::new(MemoryStore::new());
        users.add_user(UserId(1), "Amina").await;
        let store = Arc::new(FailingStore::default());
        let router = MessageRouter::new(registry.clone(), users.clone(), users, store.clone());

        let a = RecordingConnection::new();
        let b = RecordingConnection::new();
        registry.register(UserId(1), a.clone());
        registry.register(UserId(2), b.clone());
        let a_handle: ConnectionHandle = a.clone();

        let err = router
            .route_chat(UserId(1), &a_handle, &ChatRequest::direct(UserId(2), "x"))
            .await
            .unwrap_err();

        assert!(matches!(err, ChamaError::Store(_)));
        assert_eq!(store.attempts(), 1);
        assert_eq!(a.count(), 0);
        assert_eq!(b.count(), 0);
        assert_eq!(a_handle.id(), a.id());
    }

    #[tokio::test]
    async fn membership_failure_keeps_the_stored_message() {
        let registry = Arc::new(InMemoryRegistry::new());
        let store = Arc::new(MemoryStore::new());
        store.add_user(UserId(1), "Amina").await;
        let members = Arc::new(FailingMembership::default());
        let router = MessageRouter::new(
            registry.clone(),
            store.clone(),
            members.clone(),
            store.clone(),
        );

        let a = RecordingConnection::new();
        let b = RecordingConnection::new();
        registry.register(UserId(1), a.clone());
        registry.register(UserId(2), b.clone());
        let a_handle: ConnectionHandle = a.clone();

        let err = router
            .route_chat(UserId(1), &a_handle, &ChatRequest::group(GroupId(6), "mkutano"))
            .await
            .unwrap_err();

        assert!(matches!(err, ChamaError::Other(_)));
        assert_eq!(err.client_message(), "Internal server error");
        assert_eq!(members.attempts(), 1);
        assert_eq!(store.message_count().await, 1);
        assert_eq!(store.group_messages(GroupId(6)).await.unwrap()[0].content, "mkutano");
        assert_eq!(a.count() + b.count(), 0);
    }
}
