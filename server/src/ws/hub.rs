//! The hub: single owner of the connection registry and of fan-out decisions.
//!
//! The registry maps each user identity to that user's active connections.
//! Every mutation of one user's set happens while holding that entry's shard
//! lock, and removing an entry that became empty happens in the same critical
//! section, so no reader ever sees a user mapped to an empty set.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::connection::{Connection, EnqueueError};
use super::protocol::Envelope;
use super::{ChatId, UserId};
use crate::db::store::{ParticipantLookup, StoreError};

/// Active connections per user. A user may hold several (multiple devices).
pub type ConnectionRegistry = DashMap<UserId, Vec<Connection>>;

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("participant lookup failed for chat {chat_id}: {source}")]
    Lookup {
        chat_id: ChatId,
        #[source]
        source: StoreError,
    },
}

/// Outcome of one fan-out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Members other than the sender.
    pub recipients: usize,
    /// Connections the envelope was queued on.
    pub delivered: usize,
    /// Connections torn down because their queue was full.
    pub evicted: usize,
}

#[derive(Clone)]
pub struct Hub {
    registry: Arc<ConnectionRegistry>,
    participants: Arc<dyn ParticipantLookup>,
    /// FIFO lock per conversation, held across lookup and fan-out so that
    /// recipients observe broadcasts in invocation order.
    sequencers: Arc<DashMap<ChatId, Arc<Mutex<()>>>>,
}

impl Hub {
    pub fn new(participants: Arc<dyn ParticipantLookup>) -> Self {
        Self {
            registry: Arc::new(DashMap::new()),
            participants,
            sequencers: Arc::new(DashMap::new()),
        }
    }

    /// Add `conn` to its user's set and mark it active.
    /// No-op if it is already active or has been closed.
    pub fn register(&self, conn: &Connection) {
        let registered = match self.registry.entry(conn.user_id()) {
            Entry::Occupied(mut entry) => {
                let activated = conn.activate();
                if activated {
                    entry.get_mut().push(conn.clone());
                }
                activated
            }
            Entry::Vacant(entry) => {
                let activated = conn.activate();
                if activated {
                    entry.insert(vec![conn.clone()]);
                }
                activated
            }
        };

        if registered {
            tracing::debug!(
                user_id = conn.user_id(),
                connection_id = %conn.id(),
                connections = self.connection_count(conn.user_id()),
                "Connection registered"
            );
        }
    }

    /// Remove `conn` from the registry and close it. Idempotent.
    pub fn unregister(&self, conn: &Connection) {
        let closed = match self.registry.entry(conn.user_id()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().retain(|c| c.id() != conn.id());
                let closed = conn.close();
                if entry.get().is_empty() {
                    entry.remove();
                }
                closed
            }
            Entry::Vacant(_) => conn.close(),
        };

        if closed {
            tracing::debug!(
                user_id = conn.user_id(),
                connection_id = %conn.id(),
                "Connection unregistered"
            );
        }
    }

    /// Fan `envelope` out to every active connection of every member of its
    /// conversation except the originating user.
    ///
    /// Enqueueing never blocks: a connection whose queue is full is torn down
    /// and delivery to the remaining recipients continues.
    pub async fn broadcast(&self, envelope: Envelope) -> Result<BroadcastReport, HubError> {
        let chat_id = envelope.chat_id();
        // Declared before the turn so it drops after it, even if this future
        // is abandoned while waiting or fanning out.
        let _release = SequencerRelease {
            sequencers: &self.sequencers,
            chat_id,
        };
        let sequencer = self.sequencers.entry(chat_id).or_default().clone();
        let _turn = sequencer.lock_owned().await;

        self.fan_out(envelope).await
    }

    async fn fan_out(&self, envelope: Envelope) -> Result<BroadcastReport, HubError> {
        let chat_id = envelope.chat_id();
        let sender = envelope.user_id();
        let members = self
            .participants
            .members(chat_id)
            .await
            .map_err(|source| HubError::Lookup { chat_id, source })?;

        let mut seen = HashSet::with_capacity(members.len());
        let mut report = BroadcastReport::default();
        for member in members {
            if member == sender || !seen.insert(member) {
                continue;
            }
            report.recipients += 1;
            let (delivered, evicted) = self.enqueue_for_user(member, &envelope);
            report.delivered += delivered;
            report.evicted += evicted;
        }

        tracing::debug!(
            chat_id,
            user_id = sender,
            recipients = report.recipients,
            delivered = report.delivered,
            evicted = report.evicted,
            "Broadcast complete"
        );
        Ok(report)
    }

    /// Queue `envelope` on every connection of `user_id`, evicting any whose
    /// queue is full. Users without an active connection are skipped.
    pub fn send_to_user(&self, user_id: UserId, envelope: &Envelope) -> usize {
        self.enqueue_for_user(user_id, envelope).0
    }

    fn enqueue_for_user(&self, user_id: UserId, envelope: &Envelope) -> (usize, usize) {
        let Entry::Occupied(mut entry) = self.registry.entry(user_id) else {
            return (0, 0);
        };

        let mut delivered = 0;
        let mut evicted = 0;
        entry.get_mut().retain(|conn| match conn.try_enqueue(envelope.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(EnqueueError::Full) => {
                tracing::warn!(
                    user_id,
                    connection_id = %conn.id(),
                    "Outbound queue full, disconnecting slow consumer"
                );
                conn.close();
                evicted += 1;
                false
            }
            Err(EnqueueError::Closed) => {
                conn.close();
                false
            }
        });
        if entry.get().is_empty() {
            entry.remove();
        }
        (delivered, evicted)
    }

    /// Whether the user currently has at least one active connection.
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.registry.contains_key(&user_id)
    }

    pub fn connection_count(&self, user_id: UserId) -> usize {
        self.registry.get(&user_id).map(|v| v.len()).unwrap_or(0)
    }

    pub fn online_user_count(&self) -> usize {
        self.registry.len()
    }

    /// Whether any user maps to an empty set. Always false outside a
    /// registry critical section; exposed for tests.
    #[doc(hidden)]
    pub fn has_empty_entries(&self) -> bool {
        self.registry.iter().any(|entry| entry.value().is_empty())
    }
}

/// Drops a conversation's sequencer once no broadcast holds or awaits it.
struct SequencerRelease<'a> {
    sequencers: &'a DashMap<ChatId, Arc<Mutex<()>>>,
    chat_id: ChatId,
}

impl Drop for SequencerRelease<'_> {
    fn drop(&mut self) {
        self.sequencers
            .remove_if(&self.chat_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
