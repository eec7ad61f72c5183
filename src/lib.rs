//! OCR API - token-authenticated HTTP front end for text recognition models
//!
//! One endpoint, `POST /ocr`, takes an image as a multipart upload or a
//! base64 string, runs it through a [`Recognizer`](engine::Recognizer) and
//! returns the result as JSON.
//!
//! # Layout
//!
//! - [`config`]: YAML configuration loaded once at startup
//! - [`decode`]: base64 and image format decoding
//! - [`engine`]: the recognizer trait, CTC decoding, and the ONNX backend
//!   (`onnx` feature)
//! - [`server`], [`routes`], [`middleware`], [`state`], [`error`]: the
//!   axum service (`server` feature)
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ocr_api::{OnnxRecognizer, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServiceConfig::from_file("config.yaml")?;
//!     let recognizer = OnnxRecognizer::from_config(&config.engine)?;
//!     ocr_api::server::start_server(config, Arc::new(recognizer)).await
//! }
//! ```
//!
//! # API Endpoints
//!
//! - `POST /ocr` - form fields `auth_token`, `file` | `img_b64`,
//!   `probability`, `png_fix`
//! - `GET /health` - liveness probe (no authentication)

pub mod config;
pub mod decode;
pub mod engine;

#[cfg(feature = "server")]
pub mod cli;
#[cfg(feature = "server")]
pub mod error;
#[cfg(feature = "server")]
pub mod middleware;
#[cfg(feature = "server")]
pub mod routes;
#[cfg(feature = "server")]
pub mod server;
#[cfg(feature = "server")]
pub mod state;

pub use config::{ConfigLoadError, EngineConfig, ServiceConfig};
pub use decode::{DecodeError, ImageSource};
pub use engine::{EngineError, Recognition, RecognitionOptions, Recognizer};

#[cfg(feature = "onnx")]
pub use engine::OnnxRecognizer;

#[cfg(feature = "server")]
pub use error::{ServerError, ServerResult};
#[cfg(feature = "server")]
pub use server::start_server;
#[cfg(feature = "server")]
pub use state::ServerState;
