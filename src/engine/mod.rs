//! Recognition engine boundary.
//!
//! The HTTP layer only ever sees [`Recognizer`] and the tagged
//! [`Recognition`] it returns. What sits behind the trait (an ONNX model,
//! a remote service, a test double) is opaque to the handler.

pub mod ctc;
#[cfg(feature = "onnx")]
pub mod onnx;

use image::DynamicImage;
use serde_json::{Map, Value};
use thiserror::Error;

pub use ctc::Charset;
#[cfg(feature = "onnx")]
pub use onnx::OnnxRecognizer;

/// Per-request switches forwarded to the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecognitionOptions {
    /// Return per-step class probabilities instead of decoded text
    pub probability: bool,
    /// Flatten transparency onto white before recognition
    pub png_fix: bool,
}

/// Result shape produced by a recognizer
#[derive(Debug, Clone, PartialEq)]
pub enum Recognition {
    /// Decoded text
    Text(String),
    /// Arbitrary JSON object, returned to clients as-is
    Structured(Map<String, Value>),
    /// The engine produced output it could not interpret
    Unrecognized,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[cfg(feature = "onnx")]
    #[error("onnx runtime error: {0}")]
    Session(#[from] ort::Error),

    #[error("invalid charset: {0}")]
    Charset(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image scales to {width}px wide, limit is {max}px")]
    ImageTooWide { width: u32, max: u32 },

    #[error("engine lock poisoned")]
    Poisoned,

    #[error("recognition worker failed: {0}")]
    Worker(String),
}

/// A synchronous, possibly CPU-heavy recognition backend.
///
/// Implementations must be shareable across request tasks; callers run
/// [`Recognizer::classify`] on a blocking thread.
pub trait Recognizer: Send + Sync {
    /// Short identifier reported by the health endpoint
    fn name(&self) -> &str;

    fn classify(
        &self,
        image: &DynamicImage,
        options: RecognitionOptions,
    ) -> Result<Recognition, EngineError>;
}
