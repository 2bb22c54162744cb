//! One [`ClientSession`] per upgraded connection: owns the outbound queue
//! and the peer's identity once it joins a room. Modeled on the teacher's
//! `stream::StreamManager` connection entry (a command channel keyed by a
//! monotonic id), narrowed to a single outbound queue per session since a
//! session only ever needs to be *sent to*, never commanded.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Notify, RwLock, mpsc};

use super::protocol::ServerMessage;
use super::room::Room;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(0);

/// Result of a non-blocking enqueue onto a session's outbound queue.
#[derive(Debug, PartialEq, Eq)]
pub enum DeliverOutcome {
    Delivered,
    /// The queue was full. The caller must treat this as "slow consumer"
    /// and evict the session (spec.md §5 "Enqueue operations are
    /// non-blocking").
    Overflow,
}

/// The room a session has joined, and the peer identity it joined under.
#[derive(Clone)]
pub struct Joined {
    pub room: Arc<Room>,
    pub peer_id: String,
}

/// A single connection's session state. Cheap to clone (wraps an `Arc`
/// internally via the fields that need sharing); stored in `Arc<ClientSession>`
/// by callers so a `Room` can hold non-owning references to members.
pub struct ClientSession {
    pub connection_id: u64,
    outbound_tx: mpsc::Sender<ServerMessage>,
    joined: RwLock<Option<Joined>>,
    pub(super) close_notify: Notify,
}

impl ClientSession {
    /// Creates a session plus the receiving half of its outbound queue,
    /// which the caller hands to a write pump.
    pub fn new(queue_capacity: usize) -> (Arc<Self>, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let session = Arc::new(Self {
            connection_id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            outbound_tx: tx,
            joined: RwLock::new(None),
            close_notify: Notify::new(),
        });
        (session, rx)
    }

    /// Non-blocking enqueue (spec.md §4.3 `deliver`).
    pub fn deliver(&self, message: ServerMessage) -> DeliverOutcome {
        match self.outbound_tx.try_send(message) {
            Ok(()) => DeliverOutcome::Delivered,
            Err(_) => DeliverOutcome::Overflow,
        }
    }

    /// Idempotent: wakes up a read pump blocked waiting on input so it can
    /// run its leave transition and exit. Safe to call any number of times.
    pub fn close(&self) {
        self.close_notify.notify_waiters();
    }

    pub async fn joined_state(&self) -> Option<Joined> {
        self.joined.read().await.clone()
    }

    pub async fn is_joined(&self) -> bool {
        self.joined.read().await.is_some()
    }

    /// Transition Unjoined -> InRoom. Returns `false` (no-op) if already
    /// joined (spec.md §4.5 "double-Join on an already-joined session -> drop").
    pub async fn set_joined(&self, room: Arc<Room>, peer_id: String) -> bool {
        let mut guard = self.joined.write().await;
        if guard.is_some() {
            return false;
        }
        *guard = Some(Joined { room, peer_id });
        true
    }

    /// Clears joined state. Returns the prior state, if any, so the caller
    /// can drive the room/hub cleanup exactly once.
    pub async fn clear_joined(&self) -> Option<Joined> {
        self.joined.write().await.take()
    }
}
