use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

const MAX_ERROR_BODY: usize = 512;

pub type BackendResult<T> = Result<T, BackendError>;

/// Failures talking to the Readeck server.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("readeck unavailable")]
    Unavailable(#[source] reqwest::Error),

    #[error("readeck request timed out")]
    Timeout,

    #[error("readeck rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("failed to decode readeck response")]
    Decode(#[from] serde_json::Error),

    #[error("malformed multipart response: {0}")]
    Multipart(String),
}

impl BackendError {
    pub fn rejected(status: u16, body: &str) -> Self {
        let mut end = body.len().min(MAX_ERROR_BODY);
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        BackendError::Rejected {
            status,
            body: body[..end].to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::Rejected { status: 404, .. })
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            BackendError::Timeout
        } else {
            BackendError::Unavailable(error)
        }
    }
}

/// Errors surfaced to the device by the protocol endpoints.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown access token")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("upstream failure")]
    Upstream(#[from] BackendError),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Upstream(e) => {
                tracing::error!(error = %crate::unpack_error(e), "readeck request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "failed to reach bookmark service".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
