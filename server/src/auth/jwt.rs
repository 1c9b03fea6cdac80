//! HS256 access tokens carrying the numeric user identity in `sub`.

use std::path::{Path, PathBuf};

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ws::UserId;

const SECRET_LEN: usize = 32;
const SECRET_FILE: &str = "jwt_secret";

/// Access tokens are valid for 24 hours.
const ACCESS_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token expired")]
    Expired,
    #[error("token invalid: {0}")]
    Invalid(jsonwebtoken::errors::Error),
    #[error("failed to access signing key at {path}: {source}")]
    SecretIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::Invalid(err),
        }
    }
}

/// Read the signing key from `data_dir`, creating a fresh random one when the
/// file is missing or has the wrong length.
pub fn load_or_generate_jwt_secret(data_dir: &str) -> Result<Vec<u8>, AuthError> {
    let path = Path::new(data_dir).join(SECRET_FILE);
    let io_err = |source| AuthError::SecretIo {
        path: path.clone(),
        source,
    };

    match std::fs::read(&path) {
        Ok(key) if key.len() == SECRET_LEN => {
            tracing::info!(path = %path.display(), "Signing key loaded");
            return Ok(key);
        }
        Ok(key) => tracing::warn!(len = key.len(), "Signing key has wrong size, regenerating"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(e)),
    }

    std::fs::create_dir_all(data_dir).map_err(io_err)?;
    let key: [u8; SECRET_LEN] = rand::rng().random();
    std::fs::write(&path, key).map_err(io_err)?;
    tracing::info!(path = %path.display(), "Signing key generated");
    Ok(key.to_vec())
}

/// Mint a token for `user_id`. Login lives elsewhere; this exists for
/// operators and tests sharing the same secret.
pub fn issue_access_token(secret: &[u8], user_id: UserId) -> Result<String, AuthError> {
    let iat = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        iat,
        exp: iat + ACCESS_TOKEN_TTL_SECS,
    };
    Ok(jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )?)
}

pub fn validate_access_token(secret: &[u8], token: &str) -> Result<Claims, AuthError> {
    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(data.claims)
}
