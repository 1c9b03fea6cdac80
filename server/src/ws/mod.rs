pub mod actor;
pub mod connection;
pub mod handler;
pub mod hub;
pub mod protocol;

/// Authenticated user identity.
pub type UserId = i64;

/// Conversation identifier.
pub type ChatId = i64;

/// Default capacity of each connection's outbound queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

pub use connection::{Connection, ConnectionId, ConnectionState};
pub use hub::{BroadcastReport, Hub, HubError};
pub use protocol::Envelope;
