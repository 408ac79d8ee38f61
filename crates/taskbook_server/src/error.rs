//! HTTP projection of workflow errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use taskbook_core::db::DbError;
use taskbook_core::{RepoError, WorkflowError};

/// Error returned by every handler; rendered as `{"error": "<message>"}`.
#[derive(Debug)]
pub enum ApiError {
    Workflow(WorkflowError),
    /// Malformed request body or form.
    BadRequest(String),
    /// Blocking task panicked or was cancelled.
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Workflow(err) => workflow_status(err),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn workflow_status(err: &WorkflowError) -> StatusCode {
    match err {
        WorkflowError::Unauthenticated => StatusCode::UNAUTHORIZED,
        WorkflowError::Forbidden(_) => StatusCode::FORBIDDEN,
        WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
        WorkflowError::InvalidInput(_)
        | WorkflowError::PreconditionFailed(_)
        | WorkflowError::InvalidState(_)
        | WorkflowError::Conflict(_) => StatusCode::BAD_REQUEST,
        WorkflowError::Storage(_) | WorkflowError::Repo(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::Workflow(err) if status.is_server_error() => {
                error!(
                    "event=http_request module=server status=error error_code={} error={}",
                    err.code(),
                    err
                );
                "server error".to_string()
            }
            Self::Workflow(err) => err.to_string(),
            Self::BadRequest(message) => message,
            Self::Internal(message) => {
                error!("event=http_request module=server status=error error_code=internal error={message}");
                "server error".to_string()
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<WorkflowError> for ApiError {
    fn from(value: WorkflowError) -> Self {
        Self::Workflow(value)
    }
}

impl From<RepoError> for ApiError {
    fn from(value: RepoError) -> Self {
        Self::Workflow(value.into())
    }
}

impl From<DbError> for ApiError {
    fn from(value: DbError) -> Self {
        Self::from(RepoError::from(value))
    }
}
