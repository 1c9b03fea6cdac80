use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{routing, Router};

use crate::chat::{conversations, messages};
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Log method, path, status and latency of every request.
async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let started = Instant::now();

    let response = next.run(req).await;
    tracing::debug!(
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Request handled"
    );
    response
}

pub fn build_router(state: AppState) -> Router {
    // Bearer token required; the AuthUser extractor rejects with 401.
    let api = Router::new()
        .route(
            "/api/chats",
            routing::get(conversations::list_chats).post(conversations::create_chat),
        )
        .route("/api/chats/{chat_id}/join", routing::post(conversations::join_chat))
        .route(
            "/api/chats/{chat_id}/messages",
            routing::get(messages::get_history).post(messages::create_message),
        );

    // Token travels in the query string for browser clients.
    let ws = Router::new().route("/ws", routing::get(ws_handler::ws_upgrade));

    Router::new()
        .merge(api)
        .merge(ws)
        .route("/health", routing::get(health_check))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}
