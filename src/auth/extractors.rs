use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::{jwt::JwtKeys, repo_types::User, services::verify_token};
use crate::{error::AppError, state::AppState};

/// Extracts the bearer token and resolves it to a live user.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| {
                warn!("missing Authorization header");
                AppError::Unauthorized
            })?;

        // Expect "Bearer <token>"
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                warn!("invalid auth scheme");
                AppError::Unauthorized
            })?;

        let keys = JwtKeys::from_ref(state);
        let user = verify_token(&state.db, &keys, token).await?;
        Ok(AuthUser(user))
    }
}
