use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::protocol::Envelope;
use super::UserId;

pub type ConnectionId = Uuid;

/// Lifecycle of a connection. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting = 0,
    Active = 1,
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Active,
            _ => Self::Closed,
        }
    }
}

/// Why an envelope could not be queued for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    #[error("outbound queue is full")]
    Full,
    #[error("connection is closed")]
    Closed,
}

/// Handle to one live socket bound to one authenticated user.
///
/// Cheap to clone: the hub keeps one copy in its registry and each pump holds
/// another. The transport itself is owned by the pumps; closing the handle
/// cancels the token both pumps watch, which makes them drop their socket halves.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    queue: mpsc::Sender<Envelope>,
    state: Arc<AtomicU8>,
    shutdown: CancellationToken,
}

impl Connection {
    /// Create a connection in the `Connecting` state together with the
    /// receiving end of its bounded outbound queue.
    pub fn new(user_id: UserId, capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (queue, rx) = mpsc::channel(capacity.max(1));
        let conn = Self {
            id: Uuid::new_v4(),
            user_id,
            queue,
            state: Arc::new(AtomicU8::new(ConnectionState::Connecting as u8)),
            shutdown: CancellationToken::new(),
        };
        (conn, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Resolves once the connection has been closed.
    pub async fn closed(&self) {
        self.shutdown.cancelled().await
    }

    /// Non-blocking enqueue. Never waits for room in the queue.
    pub fn try_enqueue(&self, envelope: Envelope) -> Result<(), EnqueueError> {
        if self.is_closed() {
            return Err(EnqueueError::Closed);
        }
        self.queue.try_send(envelope).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// `Connecting -> Active`. Returns false if the connection was already
    /// active or has been closed. Only the hub calls this, under its registry lock.
    pub(crate) fn activate(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Connecting as u8,
                ConnectionState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to `Closed` and signal both pumps. Safe to call repeatedly;
    /// returns true only for the call that performed the transition.
    pub(crate) fn close(&self) -> bool {
        let previous = self
            .state
            .swap(ConnectionState::Closed as u8, Ordering::AcqRel);
        self.shutdown.cancel();
        previous != ConnectionState::Closed as u8
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}
