//! REST surface for chats and messages.

pub mod conversations;
pub mod messages;

use axum::http::StatusCode;

use crate::db::store::StoreError;

/// Map a store failure onto the HTTP status returned to the client.
pub(crate) fn store_status(err: StoreError) -> StatusCode {
    match err {
        StoreError::ChatNotFound(_) => StatusCode::NOT_FOUND,
        StoreError::PrivateChat(_) => StatusCode::FORBIDDEN,
        StoreError::NameTaken(_) => StatusCode::CONFLICT,
        other => {
            tracing::error!(error = %other, "Store operation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
