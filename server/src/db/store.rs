//! Persistence collaborators consumed by the hub and the REST send path.
//!
//! The hub only needs [`ParticipantLookup`]; the send path additionally
//! appends through [`MessageStore`]. [`SqliteStore`] implements both on top of
//! the shared rusqlite connection.

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};

use super::models::{ChatRow, MessageId, MessageRow};
use super::DbPool;
use crate::ws::{ChatId, UserId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("database lock poisoned")]
    Poisoned,
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("chat {0} not found")]
    ChatNotFound(ChatId),
    #[error("chat {0} is private")]
    PrivateChat(ChatId),
    #[error("chat name {0:?} is already taken")]
    NameTaken(String),
}

/// Resolves a conversation to the identities of its members.
#[async_trait]
pub trait ParticipantLookup: Send + Sync {
    async fn members(&self, chat_id: ChatId) -> Result<Vec<UserId>, StoreError>;
}

/// Durable append of a message record.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(
        &self,
        chat_id: ChatId,
        sender_id: UserId,
        content: &str,
    ) -> Result<MessageId, StoreError>;
}

#[derive(Clone)]
pub struct SqliteStore {
    db: DbPool,
}

impl SqliteStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = db.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut conn)
        })
        .await?
    }

    /// Create a chat and enroll its first participants in one transaction.
    /// `receiver_id` is enrolled alongside the creator (private chats).
    pub async fn create_chat(
        &self,
        name: String,
        is_private: bool,
        creator_id: UserId,
        receiver_id: Option<UserId>,
    ) -> Result<ChatId, StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let taken: bool = tx.query_row(
                "SELECT COUNT(*) FROM chats WHERE name = ?1",
                params![name],
                |row| row.get::<_, i64>(0).map(|c| c > 0),
            )?;
            if taken {
                return Err(StoreError::NameTaken(name));
            }

            tx.execute(
                "INSERT INTO chats (name, is_private) VALUES (?1, ?2)",
                params![name, is_private],
            )?;
            let chat_id = tx.last_insert_rowid();

            let mut members = vec![creator_id];
            members.extend(receiver_id.filter(|id| *id != creator_id));
            for user_id in members {
                tx.execute(
                    "INSERT OR IGNORE INTO participants (chat_id, user_id) VALUES (?1, ?2)",
                    params![chat_id, user_id],
                )?;
            }
            tx.commit()?;
            Ok(chat_id)
        })
        .await
    }

    /// Add `user_id` to a public chat. Joining twice is a no-op.
    pub async fn join_chat(&self, chat_id: ChatId, user_id: UserId) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let is_private: Option<bool> = conn
                .query_row(
                    "SELECT is_private FROM chats WHERE id = ?1",
                    params![chat_id],
                    |row| row.get(0),
                )
                .optional()?;
            match is_private {
                None => Err(StoreError::ChatNotFound(chat_id)),
                Some(true) => Err(StoreError::PrivateChat(chat_id)),
                Some(false) => {
                    conn.execute(
                        "INSERT OR IGNORE INTO participants (chat_id, user_id) VALUES (?1, ?2)",
                        params![chat_id, user_id],
                    )?;
                    Ok(())
                }
            }
        })
        .await
    }

    pub async fn chat_exists(&self, chat_id: ChatId) -> Result<bool, StoreError> {
        self.with_conn(move |conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM chats WHERE id = ?1",
                params![chat_id],
                |row| row.get::<_, i64>(0).map(|c| c > 0),
            )?)
        })
        .await
    }

    pub async fn is_participant(&self, chat_id: ChatId, user_id: UserId) -> Result<bool, StoreError> {
        self.with_conn(move |conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM participants WHERE chat_id = ?1 AND user_id = ?2",
                params![chat_id, user_id],
                |row| row.get::<_, i64>(0).map(|c| c > 0),
            )?)
        })
        .await
    }

    /// Chats the user participates in, oldest first.
    pub async fn chats_for_user(&self, user_id: UserId) -> Result<Vec<ChatRow>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.name, c.is_private, c.created_at
                 FROM chats c JOIN participants p ON p.chat_id = c.id
                 WHERE p.user_id = ?1
                 ORDER BY c.id ASC",
            )?;
            let rows = stmt
                .query_map(params![user_id], |row| {
                    Ok(ChatRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        is_private: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Full message history of a chat, oldest first.
    pub async fn history(&self, chat_id: ChatId) -> Result<Vec<MessageRow>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, sender_id, content, created_at
                 FROM messages WHERE chat_id = ?1
                 ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map(params![chat_id], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        chat_id: row.get(1)?,
                        sender_id: row.get(2)?,
                        content: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }
}

#[async_trait]
impl ParticipantLookup for SqliteStore {
    async fn members(&self, chat_id: ChatId) -> Result<Vec<UserId>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT user_id FROM participants WHERE chat_id = ?1")?;
            let members = stmt
                .query_map(params![chat_id], |row| row.get::<_, UserId>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(members)
        })
        .await
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn append(
        &self,
        chat_id: ChatId,
        sender_id: UserId,
        content: &str,
    ) -> Result<MessageId, StoreError> {
        let content = content.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO messages (chat_id, sender_id, content) VALUES (?1, ?2, ?3)",
                params![chat_id, sender_id, content],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }
}
