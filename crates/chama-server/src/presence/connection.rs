//! Connection handles: the router's view of a live socket.
//!
//! The transport owns the socket and its lifecycle. Everything else holds a
//! [`ConnectionHandle`] that can only enqueue outbound text frames.

use chama_core::{ChamaError, ChamaResult};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next id. Ids are never reused within a process.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// An outbound-only handle to one live connection.
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// Enqueue one text frame. Never blocks; a full or closed queue is a
    /// transport error.
    fn send(&self, frame: &str) -> ChamaResult<()>;
}

pub type ConnectionHandle = Arc<dyn Connection>;

/// Connection handle backed by a bounded mpsc queue that the connection's
/// writer task drains into the socket.
pub struct ChannelConnection {
    id: ConnectionId,
    tx: mpsc::Sender<String>,
}

impl ChannelConnection {
    /// Create a handle and the receiving end its writer task should drain.
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let conn = Arc::new(Self {
            id: ConnectionId::next(),
            tx,
        });
        (conn, rx)
    }

    /// Whether the writer side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Connection for ChannelConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, frame: &str) -> ChamaResult<()> {
        self.tx.try_send(frame.to_owned()).map_err(|e| match e {
            TrySendError::Full(_) => {
                ChamaError::Transport(format!("outbound queue full on {}", self.id))
            }
            TrySendError::Closed(_) => {
                ChamaError::Transport(format!("connection {} closed", self.id))
            }
        })
    }
}

impl fmt::Debug for ChannelConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelConnection")
            .field("id", &self.id)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}
