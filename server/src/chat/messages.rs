//! REST endpoints for sending messages and reading history.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::extract::AuthUser;
use crate::chat::store_status;
use crate::db::models::{MessageId, MessageRow};
use crate::db::store::MessageStore;
use crate::state::AppState;
use crate::ws::{ChatId, Envelope, UserId};

/// Maximum message content length (chars).
const MAX_CONTENT_LENGTH: usize = 500;

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct MessageIdResponse {
    pub id: MessageId,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub messages: Vec<MessageRow>,
}

/// Chat must exist (404) and the caller must belong to it (403).
async fn require_participant(
    state: &AppState,
    chat_id: ChatId,
    user_id: UserId,
) -> Result<(), StatusCode> {
    if !state.store.chat_exists(chat_id).await.map_err(store_status)? {
        return Err(StatusCode::NOT_FOUND);
    }
    if !state
        .store
        .is_participant(chat_id, user_id)
        .await
        .map_err(store_status)?
    {
        tracing::warn!(chat_id, user_id, "User is not a participant");
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(())
}

/// POST /api/chats/{chat_id}/messages
/// Persists the message, then fans it out to the chat's online members.
/// Delivery failure does not fail the request: the record is already stored.
pub async fn create_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(chat_id): Path<ChatId>,
    Json(body): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<MessageIdResponse>), StatusCode> {
    let content = body.content;
    if content.trim().is_empty() || content.chars().count() > MAX_CONTENT_LENGTH {
        return Err(StatusCode::BAD_REQUEST);
    }

    require_participant(&state, chat_id, user_id).await?;

    let id = state
        .store
        .append(chat_id, user_id, &content)
        .await
        .map_err(store_status)?;

    let envelope = Envelope::message(content, chat_id, user_id);
    if let Err(e) = state.hub.broadcast(envelope).await {
        tracing::warn!(chat_id, message_id = id, error = %e, "Broadcast of stored message failed");
    }

    tracing::info!(chat_id, message_id = id, user_id, "Message sent");
    Ok((StatusCode::CREATED, Json(MessageIdResponse { id })))
}

/// GET /api/chats/{chat_id}/messages
pub async fn get_history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(chat_id): Path<ChatId>,
) -> Result<Json<HistoryResponse>, StatusCode> {
    require_participant(&state, chat_id, user_id).await?;

    let messages = state.store.history(chat_id).await.map_err(store_status)?;
    tracing::debug!(chat_id, count = messages.len(), "Retrieved history");
    Ok(Json(HistoryResponse { messages }))
}
