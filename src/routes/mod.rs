//! API route handlers
//!
//! - `ocr`: the recognition endpoint and its form extractor
//! - `health`: liveness probe

pub mod health;
pub mod ocr;

use crate::error::ServerError;

/// 404 Not Found handler
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}

/// 405 handler for known paths hit with the wrong method
pub async fn method_not_allowed() -> ServerError {
    ServerError::MethodNotAllowed
}
