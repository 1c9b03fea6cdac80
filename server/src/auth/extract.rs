use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};

use crate::auth::jwt;
use crate::state::AppState;
use crate::ws::UserId;

/// Caller identity taken from a valid `Authorization: Bearer` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(StatusCode::UNAUTHORIZED)?;

        match jwt::validate_access_token(&state.jwt_secret, token) {
            Ok(claims) => Ok(AuthUser(claims.sub)),
            Err(e) => {
                tracing::debug!(error = %e, "Rejected bearer token");
                Err(StatusCode::UNAUTHORIZED)
            }
        }
    }
}
