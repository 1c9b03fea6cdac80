//! Database row types. These correspond 1:1 to the schema in migrations.rs.

use serde::Serialize;

use crate::ws::{ChatId, UserId};

pub type MessageId = i64;

/// Row in the chats table
#[derive(Debug, Clone, Serialize)]
pub struct ChatRow {
    pub id: ChatId,
    pub name: String,
    pub is_private: bool,
    pub created_at: String,
}

/// Row in the messages table
#[derive(Debug, Clone, Serialize)]
pub struct MessageRow {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub content: String,
    pub created_at: String,
}
