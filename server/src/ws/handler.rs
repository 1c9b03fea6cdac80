use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use serde::Deserialize;

use crate::auth::jwt::{self, AuthError};
use crate::state::AppState;
use crate::ws::actor;

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: String,
}

pub const CLOSE_TOKEN_EXPIRED: u16 = 4001;
pub const CLOSE_TOKEN_INVALID: u16 = 4002;

/// GET /ws?token=JWT
///
/// A valid token hands the socket to the connection actor under the token's
/// identity. A bad token still completes the upgrade so the client can read a
/// close code explaining why it was turned away.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let err = match jwt::validate_access_token(&state.jwt_secret, &params.token) {
        Ok(claims) => {
            let user_id = claims.sub;
            tracing::info!(user_id, "WebSocket authenticated");
            return ws.on_upgrade(move |socket| {
                actor::run_connection(socket, state.hub, user_id, state.queue_capacity)
            });
        }
        Err(err) => err,
    };

    let (code, reason) = match err {
        AuthError::Expired => (CLOSE_TOKEN_EXPIRED, "Token expired"),
        _ => (CLOSE_TOKEN_INVALID, "Token invalid"),
    };
    tracing::warn!(close_code = code, error = %err, "WebSocket auth failed");

    ws.on_upgrade(move |mut socket| async move {
        let frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        if let Err(e) = socket.send(Message::Close(Some(frame))).await {
            tracing::debug!(error = %e, "Failed to send auth close frame");
        }
    })
}
