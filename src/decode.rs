//! Image payload decoding.
//!
//! Requests carry the picture either as raw upload bytes or as a base64
//! string. Both paths end in [`decode_image`], which sniffs the format from
//! magic bytes rather than trusting any client-supplied content type.

use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use image::{DynamicImage, ImageReader, Rgb, RgbImage};
use thiserror::Error;

/// Why an image payload could not be turned into pixels.
///
/// Never shown to HTTP clients; the handler replies with a generic message.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("unreadable image: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to sniff image format: {0}")]
    Io(#[from] std::io::Error),
}

/// The single image source a request is allowed to carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Raw bytes from a multipart `file` part
    File(Bytes),
    /// Base64 text from the `img_b64` field
    Base64(String),
}

impl ImageSource {
    /// Pick the image source out of the optional form fields.
    ///
    /// Returns `None` unless exactly one of them is present. An empty
    /// `img_b64` string counts as absent, the way an untouched form text box
    /// arrives. An empty upload is still a source and fails decoding later.
    pub fn from_parts(file: Option<Bytes>, img_b64: Option<String>) -> Option<Self> {
        let img_b64 = img_b64.filter(|text| !text.is_empty());
        match (file, img_b64) {
            (Some(bytes), None) => Some(Self::File(bytes)),
            (None, Some(text)) => Some(Self::Base64(text)),
            _ => None,
        }
    }

    /// Raw encoded image bytes, base64-decoding if needed
    pub fn into_bytes(self) -> Result<Bytes, DecodeError> {
        match self {
            Self::File(bytes) => Ok(bytes),
            Self::Base64(text) => decode_base64(&text).map(Bytes::from),
        }
    }

    pub fn decode(self) -> Result<DynamicImage, DecodeError> {
        let bytes = self.into_bytes()?;
        decode_image(&bytes)
    }
}

/// Decode standard, padded base64. ASCII whitespace (line wrapping from
/// `base64` CLI tools and the like) is ignored.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, DecodeError> {
    let compact: String = text
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    Ok(STANDARD.decode(compact)?)
}

/// Decode encoded image bytes (PNG, JPEG, GIF, BMP, WebP, TIFF) into pixels
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, DecodeError> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    Ok(reader.decode()?)
}

/// Composite an image with transparency onto a white background.
///
/// Opaque images come back as plain RGB copies.
pub fn flatten_alpha(image: &DynamicImage) -> DynamicImage {
    if !image.color().has_alpha() {
        return DynamicImage::ImageRgb8(image.to_rgb8());
    }

    let rgba = image.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let alpha = u16::from(a);
        let blend = |c: u8| -> u8 {
            let c = u16::from(c);
            ((c * alpha + 255 * (255 - alpha) + 127) / 255) as u8
        };
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    DynamicImage::ImageRgb8(out)
}
