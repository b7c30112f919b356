//! Client-facing error taxonomy and its HTTP mapping.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::db::StoreError;
use crate::inference::InferenceError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Email already registered")]
    DuplicateEmail,

    /// Unknown email and wrong password share this variant.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Could not validate credentials")]
    Unauthorized,

    #[error("Uploaded image does not appear to be handwriting")]
    NotHandwriting,

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Upload exceeds the size limit")]
    PayloadTooLarge,

    #[error("Model unavailable")]
    ModelUnavailable,

    #[error("Storage unavailable")]
    StorageUnavailable,

    #[error("{0}")]
    BadRequest(String),

    #[error("Internal server error")]
    Internal,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::DuplicateEmail => StatusCode::CONFLICT,
            AppError::InvalidCredentials | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotHandwriting => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InvalidImage(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::ModelUnavailable | AppError::StorageUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "detail": self.to_string() }));

        if status == StatusCode::UNAUTHORIZED {
            return (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response();
        }
        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => AppError::DuplicateEmail,
            // the authenticated subject disappeared mid-request
            StoreError::UserNotFound(_) => AppError::Unauthorized,
            StoreError::InvalidSession(msg) => {
                error!(error = %msg, "session invariant violated");
                AppError::Internal
            }
            StoreError::Serialization(e) => {
                error!(error = %e, "serialization failed");
                AppError::Internal
            }
            StoreError::Database(e) => {
                error!(error = %e, "database error");
                AppError::StorageUnavailable
            }
        }
    }
}

impl From<InferenceError> for AppError {
    fn from(e: InferenceError) -> Self {
        match e {
            InferenceError::NotHandwriting { .. } => AppError::NotHandwriting,
            InferenceError::InvalidImage(msg) => AppError::InvalidImage(msg),
            InferenceError::ModelUnavailable(msg) => {
                error!(error = %msg, "inference failed");
                AppError::ModelUnavailable
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

pub type AppResult<T> = Result<T, AppError>;
