//! # Adaptive Compression Module
//!
//! Wraps the resize/encode layer in a convergence loop that walks quality
//! downward until the output fits the byte-size budget.
//!
//! ## Responsibilities:
//! - Decodes the source once and re-encodes at progressively lower quality
//! - Converges on the size budget with a damped proportional step
//! - Terminates on the quality floor or the attempt cap, whichever hits first
//! - Returns a best-effort result when the budget cannot be met
//!
//! ## Convergence:
//! The next quality after an oversized attempt is
//! `quality * (budget / actual_size) * DAMPING`, clamped to the floor.
//! The damping factor keeps the step from overshooting and oscillating.
//! The attempt cap backs up the floor bound, since floating-point quality
//! steps can stall just above it.
//!
//! The size budget is advisory: a floor-quality result is returned with
//! `within_budget = false` rather than failing the upload.
//!
//! Loop state lives in an explicit [`CompressionAttempt`] value, so the
//! function is safely callable concurrently for multiple images.

use crate::config::CompressionConstraints;
use crate::encoder;
use crate::error::PipelineError;
use image::GenericImageView;
use tracing::debug;

/// Minimum re-encode quality before a result is accepted regardless of size
pub const QUALITY_FLOOR: f32 = 0.1;

/// Damping applied to the proportional quality step to avoid overshoot
pub const DAMPING: f32 = 0.9;

/// Hard cap on encode attempts per image
pub const MAX_ATTEMPTS: u32 = 6;

/// A raw image as selected by the user, before compression
#[derive(Debug, Clone)]
pub struct SourceImage {
    /// Raw file bytes
    pub bytes: Vec<u8>,
    /// MIME type reported by the upload form
    pub mime: String,
    /// Display name, used for logging and error reporting
    pub name: String,
}

impl SourceImage {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
            name: name.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Output of one compression unit of work.
///
/// Ephemeral: exists only until uploaded or until the form is abandoned.
#[derive(Debug, Clone)]
pub struct CompressedImage {
    /// Encoded bytes
    pub bytes: Vec<u8>,
    /// Output MIME type (`image/jpeg` unless this is a fallback passthrough)
    pub mime: String,
    /// Decoded output dimensions; `None` for a fallback passthrough
    pub dimensions: Option<(u32, u32)>,
    /// Quality the returned bytes were encoded at
    pub quality: f32,
    /// Whether the byte-size budget was actually met
    pub within_budget: bool,
}

impl CompressedImage {
    /// Wrap the original source bytes unmodified.
    ///
    /// Used by the batch layer when compression fails for one image: the
    /// user should never lose a photo because one file was malformed
    /// enough to fail re-encoding but not so malformed it can't be
    /// uploaded as-is.
    pub(crate) fn passthrough(source: &SourceImage, max_size_bytes: usize) -> Self {
        Self {
            within_budget: source.bytes.len() <= max_size_bytes,
            bytes: source.bytes.clone(),
            mime: source.mime.clone(),
            dimensions: None,
            quality: 1.0,
        }
    }
}

/// Explicit loop state for the convergence search
#[derive(Debug, Clone, Copy)]
struct CompressionAttempt {
    quality: f32,
    attempt: u32,
}

impl CompressionAttempt {
    fn first(quality: f32) -> Self {
        Self {
            quality,
            attempt: 1,
        }
    }

    /// Damped proportional step toward the budget, clamped to the floor
    fn next(self, actual_size: usize, budget: usize) -> Self {
        let ratio = budget as f32 / actual_size as f32;
        Self {
            quality: (self.quality * ratio * DAMPING).max(QUALITY_FLOOR),
            attempt: self.attempt + 1,
        }
    }

    fn exhausted(self) -> bool {
        self.quality <= QUALITY_FLOOR + f32::EPSILON || self.attempt >= MAX_ATTEMPTS
    }
}

/// Compress a single source image against the given constraints.
///
/// Decodes once, then re-encodes at falling quality until the output fits
/// `max_size_bytes` or the search is exhausted. The returned bytes are the
/// smallest encoding seen, so they are never larger than the first-pass
/// encode.
///
/// Propagates [`PipelineError::Decode`] for invalid sources; a missed size
/// budget is not an error.
pub fn compress(
    source: &SourceImage,
    constraints: &CompressionConstraints,
) -> Result<CompressedImage, PipelineError> {
    let image = encoder::decode(&source.bytes)?;
    let (width, height) = image.dimensions();
    let dimensions = encoder::fit_within(width, height, constraints.max_width, constraints.max_height);
    let budget = constraints.max_size_bytes;

    let mut state = CompressionAttempt::first(constraints.quality);
    let mut bytes = encoder::encode_jpeg(&image, constraints, state.quality)?;
    let mut quality = state.quality;
    let mut last_size = bytes.len();

    // keep the smallest encoding seen; the proportional step follows the
    // latest attempt, not the retained best
    while bytes.len() > budget && !state.exhausted() {
        debug!(
            "{}: attempt {} at quality {:.2} produced {} bytes (budget {}), retrying",
            source.name, state.attempt, state.quality, last_size, budget
        );
        state = state.next(last_size, budget);

        let attempt = encoder::encode_jpeg(&image, constraints, state.quality)?;
        last_size = attempt.len();
        if last_size < bytes.len() {
            bytes = attempt;
            quality = state.quality;
        }
    }

    let within_budget = bytes.len() <= budget;

    if !within_budget {
        debug!(
            "{}: size budget unmet at quality {:.2} ({} bytes > {}), returning best effort",
            source.name,
            quality,
            bytes.len(),
            budget
        );
    }

    Ok(CompressedImage {
        bytes,
        mime: encoder::JPEG_MIME.to_string(),
        dimensions: Some(dimensions),
        quality,
        within_budget,
    })
}
