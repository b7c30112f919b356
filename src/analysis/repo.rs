use sqlx::SqlitePool;
use tracing::warn;

use crate::analysis::repo_types::AnalysisHistory;
use crate::auth::repo_types::User;
use crate::db::{now_utc, StoreError, StoreResult};
use crate::inference::TraitScores;

impl AnalysisHistory {
    /// Append a history row. An unknown `user_id` is an error, never a no-op.
    pub async fn record(
        db: &SqlitePool,
        user_id: i64,
        traits: &TraitScores,
        confidence: f64,
    ) -> StoreResult<AnalysisHistory> {
        if User::find_by_id(db, user_id).await?.is_none() {
            warn!(user_id, "analysis recorded for unknown user");
            return Err(StoreError::UserNotFound(user_id));
        }

        let encoded = serde_json::to_string(traits)?;
        let row = sqlx::query_as::<_, AnalysisHistory>(
            r#"
            INSERT INTO analysis_history (user_id, traits, confidence, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, user_id, traits, confidence, created_at
            "#,
        )
        .bind(user_id)
        .bind(encoded)
        .bind(confidence)
        .bind(now_utc())
        .fetch_one(db)
        .await?;
        Ok(row)
    }

    /// Newest first.
    pub async fn list_by_user(
        db: &SqlitePool,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<AnalysisHistory>> {
        let rows = sqlx::query_as::<_, AnalysisHistory>(
            r#"
            SELECT id, user_id, traits, confidence, created_at
            FROM analysis_history
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub fn scores(&self) -> StoreResult<TraitScores> {
        Ok(serde_json::from_str(&self.traits)?)
    }
}
