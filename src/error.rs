//! # Error Types Module
//!
//! Error taxonomy for the asset pipeline.
//!
//! ## Categories:
//! - `Decode`: source bytes are not a valid image (per-image, never aborts a batch)
//! - `Encode`: re-encoding a decoded image failed
//! - `Io`: file I/O errors (config loading)
//! - `Cardinality`: a reconciliation would leave a listing with too many or
//!   too few photos (hard precondition failure, nothing is mutated)
//! - `SlugExhausted`: no free public identifier could be derived for a listing
//! - `Metadata`: a metadata-store operation that carries an invariant
//!   (re-keying, order renumbering) failed
//! - `Validation`: invalid configuration input
//!
//! Per-item upload and delete failures are deliberately *not* represented
//! here: they are counted into the reconciliation outcome so the caller can
//! report "N of M photos saved" instead of failing the whole save.

/// Custom error types for the listing asset pipeline
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("image decode error: {0}")]
    Decode(image::ImageError),

    #[error("image encode error: {0}")]
    Encode(image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("a listing must keep between {min} and {max} photos, this change would leave {actual}")]
    Cardinality {
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("no free slug found for \"{candidate}\" after {attempts} attempts")]
    SlugExhausted { candidate: String, attempts: u32 },

    #[error("metadata store error: {0}")]
    Metadata(#[from] StoreError),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Opaque failure reported by a storage collaborator (blob store or
/// metadata store). Implementations wrap their backend-specific errors
/// into this type at the trait boundary.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct StoreError(String);

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
