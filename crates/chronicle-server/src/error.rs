use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chronicle_core::{ExportError, ReplayError};
use chronicle_net::NetError;
use chronicle_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Platform error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidName(_) | StoreError::Row { .. } => Self::BadRequest(e.to_string()),
            StoreError::NotFound(_) | StoreError::NoFailedBatch => Self::NotFound(e.to_string()),
            StoreError::FailedBatchOutstanding { .. } | StoreError::FailedBatchMismatch { .. } => {
                Self::Conflict(e.to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<NetError> for ServerError {
    fn from(e: NetError) -> Self {
        if e.is_not_found() {
            Self::NotFound(e.to_string())
        } else {
            Self::Upstream(e.to_string())
        }
    }
}

impl From<ExportError> for ServerError {
    fn from(e: ExportError) -> Self {
        match e {
            ExportError::Net(e) => e.into(),
            ExportError::Store(e) => e.into(),
            ExportError::NotAForum(_) => Self::BadRequest(e.to_string()),
        }
    }
}

impl From<ReplayError> for ServerError {
    fn from(e: ReplayError) -> Self {
        match e {
            ReplayError::Net(e) => e.into(),
            ReplayError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ServerError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ServerError::Upstream(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            ServerError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
