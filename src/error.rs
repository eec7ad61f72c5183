use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::decode::DecodeError;
use crate::engine::EngineError;

pub type ServerResult<T> = Result<T, ServerError>;

/// Detail returned when the image source is missing or ambiguous
pub const SOURCE_CONFLICT_DETAIL: &str = "Either file or image must be provided, but not both";

/// Request-level failures.
///
/// `Display` is the client-facing `detail` string, so wrapped causes are
/// logged in [`IntoResponse`] and never formatted into the message.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{}", SOURCE_CONFLICT_DETAIL)]
    SourceConflict,

    #[error("Invalid image data")]
    InvalidImage(#[source] DecodeError),

    #[error("{0}")]
    BadRequest(String),

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Unknown error")]
    Engine(#[from] EngineError),

    #[error("Unknown error")]
    UnknownOutput,

    #[error("Request timeout")]
    Timeout,

    #[error("Not Found")]
    NotFound,

    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error")]
    Internal(String),
}

/// API error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl ServerError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServerError::SourceConflict
            | ServerError::InvalidImage(_)
            | ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ServerError::Engine(_)
            | ServerError::UnknownOutput
            | ServerError::Config(_)
            | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn log(&self) {
        match self {
            ServerError::InvalidImage(source) => {
                tracing::debug!(error = %source, "Rejected undecodable image");
            }
            ServerError::Engine(source) => {
                tracing::error!(error = %source, "Recognition engine failed");
            }
            ServerError::UnknownOutput => {
                tracing::warn!("Recognition engine returned an unrecognized result");
            }
            ServerError::Config(msg) | ServerError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal failure");
            }
            _ => {}
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.status_code();
        let body = Json(ErrorResponse {
            detail: self.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<DecodeError> for ServerError {
    fn from(err: DecodeError) -> Self {
        ServerError::InvalidImage(err)
    }
}
