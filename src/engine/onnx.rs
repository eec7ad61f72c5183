//! ONNX Runtime backed classification recognizer.
//!
//! Runs single-line CTC models that take a `[1, 1, 64, W]` grayscale tensor
//! normalized to `[-1, 1]` and emit per-step class scores.

use std::io;
use std::sync::Mutex;
use std::time::Instant;

use image::DynamicImage;
use image::imageops::FilterType;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::Tensor;
use tracing::{debug, info, warn};

use super::ctc::{self, Charset};
use super::{EngineError, Recognition, RecognitionOptions, Recognizer};
use crate::config::EngineConfig;
use crate::decode::flatten_alpha;

/// Input height the classification models are trained on
pub const INPUT_HEIGHT: u32 = 64;

const DEFAULT_INPUT_NAME: &str = "input1";

pub struct OnnxRecognizer {
    // `Session::run` needs exclusive access.
    session: Mutex<Session>,
    input_name: String,
    charset: Charset,
    max_width: u32,
}

impl OnnxRecognizer {
    /// Load the model and charset named in `config`
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let charset = Charset::from_file(&config.charset_path)?;
        if !config.model_path.is_file() {
            return Err(EngineError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("model file not found: {}", config.model_path.display()),
            )));
        }

        let started = Instant::now();
        let session = build_session(config)?;
        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| DEFAULT_INPUT_NAME.to_string());

        info!(
            model = %config.model_path.display(),
            charset_size = charset.len(),
            input = %input_name,
            load_ms = started.elapsed().as_millis() as u64,
            "Recognition model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            charset,
            max_width: config.max_width,
        })
    }

    fn infer(&self, image: &DynamicImage) -> Result<(Vec<usize>, Vec<f32>), EngineError> {
        let (width, pixels) = preprocess(image, self.max_width)?;
        let input = Tensor::from_array(([1usize, 1, INPUT_HEIGHT as usize, width], pixels))?;

        let mut session = self.session.lock().map_err(|_| EngineError::Poisoned)?;
        let outputs = session.run(ort::inputs![self.input_name.as_str() => input])?;
        let (shape, scores) = outputs[0].try_extract_tensor::<f32>()?;

        let dims = shape.iter().map(|&d| d.max(0) as usize).collect();
        Ok((dims, scores.to_vec()))
    }
}

impl Recognizer for OnnxRecognizer {
    fn name(&self) -> &str {
        "onnx-ctc"
    }

    fn classify(
        &self,
        image: &DynamicImage,
        options: RecognitionOptions,
    ) -> Result<Recognition, EngineError> {
        let flattened;
        let image = if options.png_fix {
            flattened = flatten_alpha(image);
            &flattened
        } else {
            image
        };

        let (dims, scores) = self.infer(image)?;
        let Some((steps, classes)) = step_layout(&dims) else {
            warn!(?dims, "Unexpected recognition output rank");
            return Ok(Recognition::Unrecognized);
        };
        if classes != self.charset.len() || scores.len() != steps * classes {
            warn!(
                ?dims,
                charset_size = self.charset.len(),
                "Recognition output does not match charset"
            );
            return Ok(Recognition::Unrecognized);
        }
        debug!(steps, classes, "Decoding recognition output");

        if options.probability {
            Ok(Recognition::Structured(ctc::probability_map(
                &scores,
                classes,
                &self.charset,
            )))
        } else {
            Ok(Recognition::Text(ctc::greedy_decode(
                &scores,
                classes,
                &self.charset,
            )))
        }
    }
}

fn build_session(config: &EngineConfig) -> Result<Session, ort::Error> {
    let mut builder = Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
    if let Some(threads) = config.intra_threads {
        builder = builder.with_intra_threads(threads)?;
    }
    builder.commit_from_file(&config.model_path)
}

/// Resize to the model height keeping aspect ratio, grayscale, and scale
/// each pixel to `[-1, 1]`. Returns the resized width and the flat tensor.
///
/// Fails without allocating when the scaled width exceeds `max_width`.
pub fn preprocess(
    image: &DynamicImage,
    max_width: u32,
) -> Result<(usize, Vec<f32>), EngineError> {
    let width = scaled_width(image.width(), image.height());
    if width > max_width {
        return Err(EngineError::ImageTooWide {
            width,
            max: max_width,
        });
    }

    let gray = image
        .resize_exact(width, INPUT_HEIGHT, FilterType::Lanczos3)
        .to_luma8();

    let pixels = gray
        .into_raw()
        .into_iter()
        .map(|p| (f32::from(p) / 255.0 - 0.5) / 0.5)
        .collect();
    Ok((width as usize, pixels))
}

fn scaled_width(width: u32, height: u32) -> u32 {
    if height == 0 {
        return 1;
    }
    let scaled = u64::from(width) * u64::from(INPUT_HEIGHT) / u64::from(height);
    scaled.clamp(1, u64::from(u32::MAX)) as u32
}

/// Interpret an output shape as `(steps, classes)`.
///
/// Accepts `[T, 1, C]` (sequence-first), `[1, T, C]` (batch-first) and
/// `[T, C]`.
fn step_layout(dims: &[usize]) -> Option<(usize, usize)> {
    match *dims {
        [steps, 1, classes] | [1, steps, classes] | [steps, classes] if classes > 0 => {
            Some((steps, classes))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_scaled_width_keeps_aspect() {
        assert_eq!(scaled_width(160, 64), 160);
        assert_eq!(scaled_width(100, 32), 200);
        assert_eq!(scaled_width(99, 128), 49);
        assert_eq!(scaled_width(1, 1000), 1);
        assert_eq!(scaled_width(10, 0), 1);
    }

    #[test]
    fn test_preprocess_normalizes() {
        let white = DynamicImage::ImageLuma8(GrayImage::from_pixel(32, 32, Luma([255])));
        let (width, pixels) = preprocess(&white, 4096).unwrap();
        assert_eq!(width, 64);
        assert_eq!(pixels.len(), 64 * 64);
        assert!(pixels.iter().all(|&p| (p - 1.0).abs() < 1e-3));

        let black = DynamicImage::ImageLuma8(GrayImage::from_pixel(10, 64, Luma([0])));
        let (_, pixels) = preprocess(&black, 4096).unwrap();
        assert!(pixels.iter().all(|&p| (p + 1.0).abs() < 1e-3));
    }

    #[test]
    fn test_preprocess_refuses_overly_wide_input() {
        let strip = DynamicImage::ImageLuma8(GrayImage::from_pixel(65_535, 1, Luma([0])));
        assert!(matches!(
            preprocess(&strip, 4096),
            Err(EngineError::ImageTooWide { width: 4_194_240, max: 4096 })
        ));

        let edge = DynamicImage::ImageLuma8(GrayImage::from_pixel(128, 64, Luma([0])));
        assert!(preprocess(&edge, 128).is_ok());
        assert!(matches!(
            preprocess(&edge, 127),
            Err(EngineError::ImageTooWide { width: 128, max: 127 })
        ));
    }

    #[test]
    fn test_step_layout() {
        assert_eq!(step_layout(&[25, 1, 8210]), Some((25, 8210)));
        assert_eq!(step_layout(&[1, 25, 8210]), Some((25, 8210)));
        assert_eq!(step_layout(&[25, 8210]), Some((25, 8210)));
        assert_eq!(step_layout(&[25, 2, 8210]), None);
        assert_eq!(step_layout(&[8210]), None);
        assert_eq!(step_layout(&[25, 1, 0]), None);
    }

    #[test]
    fn test_missing_files_fail_fast() {
        let config = EngineConfig {
            model_path: "/nope/model.onnx".into(),
            charset_path: "/nope/charset.json".into(),
            intra_threads: None,
            max_width: 4096,
        };
        assert!(matches!(
            OnnxRecognizer::from_config(&config),
            Err(EngineError::Io(_))
        ));
    }
}
