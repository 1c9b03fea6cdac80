use std::sync::Arc;

use crate::db::store::SqliteStore;
use crate::db::DbPool;
use crate::ws::Hub;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Chats, participants and message history
    pub store: SqliteStore,
    /// Live connection registry and fan-out
    pub hub: Hub,
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    /// Outbound queue capacity for each new connection
    pub queue_capacity: usize,
}

impl AppState {
    /// Wire the hub to resolve conversation membership through the store.
    pub fn new(db: DbPool, jwt_secret: Vec<u8>, queue_capacity: usize) -> Self {
        let store = SqliteStore::new(db);
        let hub = Hub::new(Arc::new(store.clone()));
        Self {
            store,
            hub,
            jwt_secret,
            queue_capacity,
        }
    }
}
