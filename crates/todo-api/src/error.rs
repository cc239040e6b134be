use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use infrastructure::ErrorBody;
use thiserror::Error;
use todo_domain::TodoError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] TodoError),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidBody(rejection.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Store(TodoError::Validation(_)) | ApiError::InvalidBody(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Store(TodoError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Store(TodoError::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::Store(TodoError::Transport(_)) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn as_todo_error(&self) -> TodoError {
        match self {
            ApiError::Store(e) => e.clone(),
            ApiError::InvalidBody(message) => TodoError::Validation(message.clone()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }

        (status, Json(ErrorBody::from(&self.as_todo_error()))).into_response()
    }
}
