use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::inference::TraitScores;

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub traits: TraitScores,
    pub confidence: f64,
}

#[derive(Debug, Serialize)]
pub struct HistoryItem {
    pub id: i64,
    pub traits: TraitScores,
    pub confidence: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

impl Pagination {
    pub const MAX_LIMIT: i64 = 100;

    /// Limit clamped to `1..=MAX_LIMIT`, offset floored at zero.
    pub fn bounds(&self) -> (i64, i64) {
        (self.limit.clamp(1, Self::MAX_LIMIT), self.offset.max(0))
    }
}
