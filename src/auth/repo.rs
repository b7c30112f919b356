use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::debug;

use crate::auth::repo_types::{Session, User};
use crate::db::{is_unique_violation, now_utc, StoreError, StoreResult};

impl User {
    /// Find a user by email. The comparison is exact.
    pub async fn find_by_email(db: &SqlitePool, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, first_name, last_name, password_hash, created_at, updated_at
            FROM users
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &SqlitePool, id: i64) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, first_name, last_name, password_hash, created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Create a new user with an already hashed password.
    pub async fn create(
        db: &SqlitePool,
        email: &str,
        first_name: &str,
        last_name: &str,
        password_hash: &str,
    ) -> StoreResult<User> {
        let now = now_utc();
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, first_name, last_name, password_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, email, first_name, last_name, password_hash, created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(first_name)
        .bind(last_name)
        .bind(password_hash)
        .bind(now)
        .bind(now)
        .fetch_one(db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateEmail
            } else {
                StoreError::Database(e)
            }
        })?;
        Ok(user)
    }
}

impl Session {
    pub async fn create(
        db: &SqlitePool,
        user_id: i64,
        session_token: &str,
        created_at: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> StoreResult<Session> {
        if expires_at <= created_at {
            return Err(StoreError::InvalidSession(
                "expiry must be after creation".into(),
            ));
        }

        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO user_sessions (user_id, session_token, created_at, expires_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, user_id, session_token, created_at, expires_at
            "#,
        )
        .bind(user_id)
        .bind(session_token)
        .bind(created_at)
        .bind(expires_at)
        .fetch_one(db)
        .await?;
        Ok(session)
    }

    /// Remove sessions whose expiry is at or before `now`.
    pub async fn delete_expired(db: &SqlitePool, now: OffsetDateTime) -> StoreResult<u64> {
        let res = sqlx::query("DELETE FROM user_sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(db)
            .await?;
        debug!(removed = res.rows_affected(), "expired sessions purged");
        Ok(res.rows_affected())
    }
}
