use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::warn;

use tether_gateway::router::run_blocking;
use tether_types::api::Claims;

use crate::error::ApiError;
use crate::state::AppState;

/// Verify an HS256 token issued by the identity provider.
pub fn decode_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

/// The token from an `Authorization: Bearer` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Extract and validate JWT from Authorization header, then mirror the
/// caller's profile so peers and previews can show it.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers()).ok_or(ApiError::MissingCredentials)?;
    let claims = decode_token(&state.jwt_secret, token).map_err(|_| ApiError::MissingCredentials)?;

    let db = state.db.clone();
    let profile = claims.clone();
    if let Err(e) = run_blocking(move || {
        db.upsert_user(
            profile.sub,
            &profile.name,
            &profile.email,
            profile.avatar_url.as_deref(),
        )
    })
    .await
    {
        warn!("Failed to mirror profile for {}: {}", claims.sub, e);
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
