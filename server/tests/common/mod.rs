//! Shared helpers for hub and actor tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chathub_server::db::store::{ParticipantLookup, StoreError};
use chathub_server::ws::{ChatId, Hub, UserId};

/// Participant lookup backed by a fixed membership table.
pub struct FixedMembers(pub HashMap<ChatId, Vec<UserId>>);

#[async_trait]
impl ParticipantLookup for FixedMembers {
    async fn members(&self, chat_id: ChatId) -> Result<Vec<UserId>, StoreError> {
        self.0
            .get(&chat_id)
            .cloned()
            .ok_or(StoreError::ChatNotFound(chat_id))
    }
}

/// Hub whose conversations have the given members.
pub fn hub_with_chats(chats: Vec<(ChatId, Vec<UserId>)>) -> Hub {
    Hub::new(Arc::new(FixedMembers(chats.into_iter().collect())))
}
