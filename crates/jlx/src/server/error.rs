//! 🚨 API errors: the part of the crate that has to say "no" in HTTP.
//!
//! Every failure a caller can see ends up here, gets a status code, and leaves
//! as `{"detail": "..."}`. The message is meant for a human at a terminal, so
//! it names the bucket or path that caused the trouble.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::consolidate::FetchError;

/// 📨 The error body. One field. It's all anyone reads anyway.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// 🚨 Caller-facing errors, one per status code we actually use.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// 🔒 401: no keys, or keys the store didn't like.
    #[error("{0}")]
    Unauthorized(String),
    /// 🔍 404: the bucket or the stream folders aren't where the caller said.
    #[error("{0}")]
    NotFound(String),
    /// 📝 422: the body parsed, but it doesn't make sense.
    #[error("{0}")]
    InvalidRequest(String),
    /// 💀 500: everything else.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        let the_message = err.to_string();
        match err {
            FetchError::MissingCredentials | FetchError::InvalidCredentials(_) => {
                ApiError::Unauthorized(the_message)
            }
            FetchError::BucketNotFound { .. } | FetchError::NoPartitionsFound { .. } => {
                ApiError::NotFound(the_message)
            }
            FetchError::Store(_) | FetchError::Unexpected(_) => ApiError::Internal(the_message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let the_status = self.status();
        (
            the_status,
            Json(ErrorBody {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}
