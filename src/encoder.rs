//! # Resize and Re-encode Module
//!
//! Pure in-memory resize + JPEG re-encode, the lowest layer of the
//! compression pipeline.
//!
//! ## Responsibilities:
//! - Decodes raw upload bytes into a raster image (JPEG/PNG/WebP inputs)
//! - Computes a uniform downscale factor that fits the resolution bounds
//! - Re-encodes at a caller-supplied quality, always to JPEG
//!
//! Input formats are normalized to one lossy output format so downstream
//! handling (storage paths, MIME headers, previews) stays predictable.
//! Nothing here touches storage; every function is synchronous and
//! side-effect free.

use crate::config::CompressionConstraints;
use crate::error::PipelineError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GenericImageView};

/// MIME type of every encoded output, regardless of input format
pub const JPEG_MIME: &str = "image/jpeg";

/// Decode raw bytes into a raster image.
///
/// Fails with [`PipelineError::Decode`] when the bytes cannot be
/// interpreted as an image in any enabled format.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, PipelineError> {
    image::load_from_memory(bytes).map_err(PipelineError::Decode)
}

/// Compute target dimensions that fit within the given bounds.
///
/// The scale factor is `min(1, max_width/width, max_height/height)`:
/// aspect ratio is preserved and images are never upscaled. Dimensions
/// are floored at one pixel.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let scale = f64::min(
        1.0,
        f64::min(
            max_width as f64 / width as f64,
            max_height as f64 / height as f64,
        ),
    );

    let target_width = ((width as f64 * scale).round() as u32).max(1);
    let target_height = ((height as f64 * scale).round() as u32).max(1);
    (target_width, target_height)
}

/// Resize a decoded image into the constraint bounds and encode it as
/// JPEG at the given quality.
///
/// `quality` is in (0, 1] and is mapped onto the JPEG encoder's 1-100
/// scale. Alpha channels are flattened by the RGB conversion.
pub fn encode_jpeg(
    image: &DynamicImage,
    constraints: &CompressionConstraints,
    quality: f32,
) -> Result<Vec<u8>, PipelineError> {
    let (width, height) = image.dimensions();
    let (target_width, target_height) =
        fit_within(width, height, constraints.max_width, constraints.max_height);

    let resized;
    let frame = if (target_width, target_height) != (width, height) {
        resized = image.resize_exact(target_width, target_height, FilterType::Lanczos3);
        &resized
    } else {
        image
    };

    let rgb = frame.to_rgb8();
    let mut output = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut output, jpeg_quality(quality));
    encoder
        .encode(rgb.as_raw(), target_width, target_height, ColorType::Rgb8)
        .map_err(PipelineError::Encode)?;

    Ok(output)
}

/// Map a (0, 1] quality factor onto the JPEG encoder's 1-100 scale
pub(crate) fn jpeg_quality(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}
