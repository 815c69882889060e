// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{config::Config, error::AppError, models::identity::Identity};

/// JWT Claims structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - the candidate id.
    pub sub: String,
    /// Display name, if the issuer provides one.
    #[serde(default)]
    pub name: Option<String>,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
    /// Set on tokens this service issues to anonymous candidates.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub guest: bool,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        if claims.guest {
            Identity::Anonymous {
                guest_id: claims.sub,
            }
        } else {
            Identity::Authenticated {
                subject_id: claims.sub,
                display_name: claims.name,
            }
        }
    }
}

/// Signs a token for `subject_id`.
///
/// Tokens are normally issued by the external auth service; this exists for
/// tooling and tests that share its secret.
pub fn sign_jwt(
    subject_id: &str,
    name: Option<&str>,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    let claims = Claims {
        sub: subject_id.to_owned(),
        name: name.map(str::to_owned),
        exp: expires_at(expiration_seconds)?,
        guest: false,
    };
    encode_claims(&claims, secret)
}

/// Signs the token that lets an anonymous candidate return to its session.
pub fn sign_guest_jwt(
    guest_id: &str,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    let claims = Claims {
        sub: guest_id.to_owned(),
        name: None,
        exp: expires_at(expiration_seconds)?,
        guest: true,
    };
    encode_claims(&claims, secret)
}

// Calculate expiration: current time + expiration_seconds
fn expires_at(expiration_seconds: u64) -> Result<usize, AppError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs();
    Ok((now + expiration_seconds) as usize)
}

fn encode_claims(claims: &Claims, secret: &str) -> Result<String, AppError> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies and decodes a JWT string.
///
/// Returns the `Claims` if valid, otherwise returns an `AppError`.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// Axum Middleware: Identity.
///
/// Injects an `Identity` into the request extensions.
/// * No `Authorization` header: a new anonymous candidate with a fresh guest id.
/// * Valid guest token: the anonymous candidate it was issued to.
/// * Valid `Bearer <token>`: authenticated candidate.
/// * Anything else: 401 Unauthorized.
pub async fn identity_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req.headers().get(header::AUTHORIZATION);

    let identity = match auth_header {
        None => Identity::guest(),
        Some(value) => {
            let token = value
                .to_str()
                .ok()
                .and_then(|h| h.strip_prefix("Bearer "))
                .ok_or(StatusCode::UNAUTHORIZED)?;
            let claims =
                verify_jwt(token, &config.jwt_secret).map_err(|_| StatusCode::UNAUTHORIZED)?;
            Identity::from(claims)
        }
    };

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
