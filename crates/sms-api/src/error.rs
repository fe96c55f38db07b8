use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

use sms_dispatch::DispatchError;
use sms_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation { errors: Vec<String> },

    #[error("Message not found with id: {0}")]
    NotFound(i64),

    #[error("Message {0} was accepted but could not be queued for delivery")]
    EnqueueFailed(i64),

    #[error("Storage unavailable: {0}")]
    Store(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e.to_string())
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Store(inner) => ApiError::Store(inner.to_string()),
            DispatchError::EnqueueFailed { message_id, .. } => {
                ApiError::EnqueueFailed(message_id)
            }
        }
    }
}

/// Error response body returned to clients.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, errors) = match &self {
            ApiError::Validation { errors } => (StatusCode::BAD_REQUEST, Some(errors.clone())),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, None),
            ApiError::EnqueueFailed(_) => (StatusCode::BAD_GATEWAY, None),
            ApiError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };

        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let body = ErrorBody {
            status: status.as_u16(),
            message: self.to_string(),
            errors,
            timestamp: Utc::now(),
        };

        (status, Json(body)).into_response()
    }
}
