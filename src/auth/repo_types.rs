use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,                      // autoincrement user ID
    pub email: String,                // stored exactly as registered
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,        // Argon2 hash, not exposed in JSON
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// One issued access token, keyed by its `jti`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub session_token: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}
