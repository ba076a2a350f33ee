//! In-process doubles shared by unit tests.

use crate::presence::{Connection, ConnectionId};
use crate::store::{MembershipDirectory, MessageStore, NewMessage, StoredMessage};
use async_trait::async_trait;
use chama_core::{decode_outbound, ChamaError, ChamaResult, GroupId, MessageId, Outbound, UserId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Connection that records every frame sent to it.
pub struct RecordingConnection {
    id: ConnectionId,
    frames: Mutex<Vec<String>>,
}

impl RecordingConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::next(),
            frames: Mutex::new(Vec::new()),
        })
    }

    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }

    /// Recorded frames decoded as server envelopes.
    pub fn outbound(&self) -> Vec<Outbound> {
        self.frames()
            .iter()
            .map(|f| decode_outbound(f).unwrap())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

impl Connection for RecordingConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, frame: &str) -> ChamaResult<()> {
        self.frames.lock().unwrap().push(frame.to_owned());
        Ok(())
    }
}

/// Connection whose every send fails, like a socket that has gone away.
pub struct FailingConnection {
    id: ConnectionId,
    attempts: AtomicUsize,
}

impl FailingConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::next(),
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connection for FailingConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, _frame: &str) -> ChamaResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ChamaError::Transport("connection reset by peer".into()))
    }
}

/// Message store that rejects every write and counts attempts.
#[derive(Default)]
pub struct FailingStore {
    attempts: AtomicUsize,
}

impl FailingStore {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageStore for FailingStore {
    async fn create_message(&self, _msg: NewMessage) -> ChamaResult<StoredMessage> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ChamaError::Store("database is locked".into()))
    }

    async fn user_messages(&self, _user: UserId) -> ChamaResult<Vec<StoredMessage>> {
        Ok(Vec::new())
    }

    async fn group_messages(&self, _group: GroupId) -> ChamaResult<Vec<StoredMessage>> {
        Ok(Vec::new())
    }

    async fn mark_read(&self, _id: MessageId) -> ChamaResult<Option<StoredMessage>> {
        Ok(None)
    }
}

/// Membership directory that is always unavailable.
#[derive(Default)]
pub struct FailingMembership {
    attempts: AtomicUsize,
}

impl FailingMembership {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MembershipDirectory for FailingMembership {
    async fn get_group_members(&self, _group: GroupId) -> ChamaResult<Vec<UserId>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ChamaError::Store("membership service down".into()))
    }
}
