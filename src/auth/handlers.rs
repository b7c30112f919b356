use axum::{
    extract::{rejection::JsonRejection, FromRef, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, PublicUser, SignupRequest},
        extractors::AuthUser,
        jwt::JwtKeys,
        services::{authenticate, issue_token, register},
    },
    error::AppResult,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> AppResult<Json<AuthResponse>> {
    let Json(payload) = payload?;
    let user = register(&state.db, payload).await?;
    let keys = JwtKeys::from_ref(&state);
    let issued = issue_token(&state.db, &keys, &user).await?;
    Ok(Json(AuthResponse::bearer(issued.token, user.into())))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<AuthResponse>> {
    let Json(payload) = payload?;
    let user = authenticate(&state.db, &payload.email, &payload.password).await?;
    let keys = JwtKeys::from_ref(&state);
    let issued = issue_token(&state.db, &keys, &user).await?;
    info!(user_id = user.id, "user logged in");
    Ok(Json(AuthResponse::bearer(issued.token, user.into())))
}

pub async fn get_me(AuthUser(user): AuthUser) -> Json<PublicUser> {
    Json(user.into())
}

#[cfg(test)]
mod me_tests {
    use super::*;

    #[test]
    fn public_user_serialization_hides_hash() {
        let response = PublicUser {
            id: 7,
            email: "test@example.com".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(json.contains("first_name"));
        assert!(!json.contains("password"));
    }
}
