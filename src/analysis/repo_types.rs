use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// One completed prediction. `traits` holds the JSON-encoded score map.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnalysisHistory {
    pub id: i64,
    pub user_id: i64,
    pub traits: String,
    pub confidence: f64,
    pub created_at: OffsetDateTime,
}
