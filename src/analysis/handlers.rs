use axum::{
    async_trait,
    extract::{
        rejection::QueryRejection, DefaultBodyLimit, FromRequest, Multipart, Query, Request, State,
    },
    http::{header::CONTENT_TYPE, StatusCode},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use tracing::{error, info, instrument};

use super::dto::{HistoryItem, Pagination, PredictResponse};
use super::repo_types::AnalysisHistory;
use crate::{
    auth::extractors::AuthUser,
    error::{AppError, AppResult},
    state::AppState,
};

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn predict_routes() -> Router<AppState> {
    Router::new()
        .route("/predict", post(predict))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

pub fn history_routes() -> Router<AppState> {
    Router::new().route("/history", get(list_history))
}

/// Upload body: raw image bytes, or multipart with a `file` field.
pub struct ImageUpload(pub Bytes);

fn upload_rejection(status: StatusCode, text: String) -> AppError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::BadRequest(text)
    }
}

#[async_trait]
impl<S> FromRequest<S> for ImageUpload
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("multipart/form-data"))
            .unwrap_or(false);

        if !is_multipart {
            let body = Bytes::from_request(req, state)
                .await
                .map_err(|e| upload_rejection(e.status(), e.body_text()))?;
            return Ok(ImageUpload(body));
        }

        let mut mp = Multipart::from_request(req, state)
            .await
            .map_err(|e| upload_rejection(e.status(), e.body_text()))?;
        while let Some(field) = mp
            .next_field()
            .await
            .map_err(|e| upload_rejection(e.status(), e.body_text()))?
        {
            if field.name() == Some("file") {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| upload_rejection(e.status(), e.body_text()))?;
                return Ok(ImageUpload(data));
            }
        }
        Err(AppError::BadRequest("multipart field `file` is required".into()))
    }
}

/// POST /predict
#[instrument(skip(state, user, upload), fields(user_id = user.0.id))]
pub async fn predict(
    State(state): State<AppState>,
    user: AuthUser,
    upload: ImageUpload,
) -> AppResult<Json<PredictResponse>> {
    let AuthUser(user) = user;
    let ImageUpload(bytes) = upload;

    let pipeline = state.pipeline.clone();
    let prediction = tokio::task::spawn_blocking(move || pipeline.run(&bytes))
        .await
        .map_err(|e| {
            error!(error = %e, "inference task failed");
            AppError::Internal
        })??;

    AnalysisHistory::record(&state.db, user.id, &prediction.traits, prediction.confidence).await?;
    info!(
        confidence = prediction.confidence,
        gate = prediction.gate_probability,
        "prediction recorded"
    );

    Ok(Json(PredictResponse {
        traits: prediction.traits,
        confidence: prediction.confidence,
    }))
}

/// GET /history?limit=&offset=
#[instrument(skip(state, user, query))]
pub async fn list_history(
    State(state): State<AppState>,
    user: AuthUser,
    query: Result<Query<Pagination>, QueryRejection>,
) -> AppResult<Json<Vec<HistoryItem>>> {
    let AuthUser(user) = user;
    let Query(p) = query?;
    let (limit, offset) = p.bounds();
    let rows = AnalysisHistory::list_by_user(&state.db, user.id, limit, offset).await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(HistoryItem {
            id: row.id,
            traits: row.scores()?,
            confidence: row.confidence,
            created_at: row.created_at,
        });
    }
    Ok(Json(items))
}
