//! REST endpoints for creating, joining and listing chats.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::extract::AuthUser;
use crate::chat::store_status;
use crate::db::models::ChatRow;
use crate::state::AppState;
use crate::ws::protocol::KIND_CHAT_CREATED;
use crate::ws::{ChatId, Envelope, UserId};

/// Maximum chat name length (chars).
const MAX_NAME_LENGTH: usize = 50;

#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    pub name: String,
    #[serde(default)]
    pub is_private: bool,
    /// Second participant of a private chat
    pub receiver_id: Option<UserId>,
}

#[derive(Debug, Serialize)]
pub struct ChatIdResponse {
    pub id: ChatId,
}

#[derive(Debug, Serialize)]
pub struct ChatListResponse {
    pub chats: Vec<ChatRow>,
}

/// POST /api/chats
/// Creates a chat with the caller as first participant. Private chats require
/// `receiver_id`, who is enrolled as well and notified on any open socket.
pub async fn create_chat(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<ChatIdResponse>), StatusCode> {
    let CreateChatRequest {
        name,
        is_private,
        receiver_id,
    } = body;
    if name.trim().is_empty() || name.chars().count() > MAX_NAME_LENGTH {
        return Err(StatusCode::BAD_REQUEST);
    }
    let receiver_id = match (is_private, receiver_id) {
        (true, Some(id)) if id > 0 => Some(id),
        (true, _) => return Err(StatusCode::BAD_REQUEST),
        (false, _) => None,
    };

    let id = state
        .store
        .create_chat(name.clone(), is_private, user_id, receiver_id)
        .await
        .map_err(store_status)?;

    tracing::info!(chat_id = id, user_id, "Chat created");

    // Receiver may already be connected on other devices.
    if let Some(receiver) = receiver_id.filter(|r| *r != user_id) {
        let notice = Envelope::new(KIND_CHAT_CREATED, name, id, user_id);
        let delivered = state.hub.send_to_user(receiver, &notice);
        tracing::debug!(chat_id = id, receiver, delivered, "Chat creation notice sent");
    }
    Ok((StatusCode::CREATED, Json(ChatIdResponse { id })))
}

/// POST /api/chats/{chat_id}/join
/// Joins a public chat. Private chats answer 403.
pub async fn join_chat(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(chat_id): Path<ChatId>,
) -> Result<(StatusCode, Json<ChatIdResponse>), StatusCode> {
    state
        .store
        .join_chat(chat_id, user_id)
        .await
        .map_err(store_status)?;

    tracing::info!(chat_id, user_id, "User joined chat");
    Ok((StatusCode::CREATED, Json(ChatIdResponse { id: chat_id })))
}

/// GET /api/chats
pub async fn list_chats(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ChatListResponse>, StatusCode> {
    let chats = state
        .store
        .chats_for_user(user_id)
        .await
        .map_err(store_status)?;
    Ok(Json(ChatListResponse { chats }))
}
