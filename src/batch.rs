//! # Batch Compression Module
//!
//! Fans a list of source images out to the adaptive compressor.
//!
//! ## Responsibilities:
//! - Runs per-image compression concurrently on blocking worker threads
//! - Preserves input order in the output (the UI matches thumbnails by index)
//! - Isolates per-item failures: a malformed file falls back to its
//!   original bytes instead of aborting the batch or dropping the photo
//! - Collects a typed per-item status so the caller can distinguish
//!   "all compressed" from "some fell back" without parsing logs

use crate::compressor::{self, CompressedImage, SourceImage};
use crate::config::CompressionConstraints;
use tokio::task;
use tracing::{error, warn};

/// Per-item result of a batch run
#[derive(Debug, Clone, PartialEq)]
pub enum ItemStatus {
    /// The image was re-encoded by the adaptive compressor
    Compressed,
    /// Compression failed; the original bytes were kept (reason attached)
    Fallback(String),
}

/// Outcome of compressing a batch of source images.
///
/// `images` has the same length and order as the input; `statuses` is
/// parallel to it.
#[derive(Debug)]
pub struct BatchResult {
    pub images: Vec<CompressedImage>,
    pub statuses: Vec<ItemStatus>,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn compressed_count(&self) -> usize {
        self.statuses
            .iter()
            .filter(|s| matches!(s, ItemStatus::Compressed))
            .count()
    }

    pub fn fallback_count(&self) -> usize {
        self.len() - self.compressed_count()
    }

    /// True when every item was re-encoded successfully
    pub fn is_clean(&self) -> bool {
        self.fallback_count() == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "Compressed: {} of {} photos | Kept original: {}",
            self.compressed_count(),
            self.len(),
            self.fallback_count()
        )
    }
}

/// Compress every source image independently.
///
/// Items run concurrently with no ordering dependency between them; the
/// output array preserves input order. A per-item compression failure is
/// logged and converted into a passthrough of the original bytes.
pub async fn compress_all(
    sources: &[SourceImage],
    constraints: &CompressionConstraints,
) -> BatchResult {
    let mut handles = Vec::with_capacity(sources.len());
    for source in sources {
        let source = source.clone();
        let constraints = constraints.clone();
        handles.push(task::spawn_blocking(move || {
            compressor::compress(&source, &constraints)
        }));
    }

    let joined = futures::future::join_all(handles).await;

    let mut images = Vec::with_capacity(sources.len());
    let mut statuses = Vec::with_capacity(sources.len());
    for (source, result) in sources.iter().zip(joined) {
        match result {
            Ok(Ok(image)) => {
                images.push(image);
                statuses.push(ItemStatus::Compressed);
            }
            Ok(Err(e)) => {
                warn!(
                    "compression failed for {}: {}, keeping original {} bytes",
                    source.name,
                    e,
                    source.len()
                );
                images.push(CompressedImage::passthrough(source, constraints.max_size_bytes));
                statuses.push(ItemStatus::Fallback(e.to_string()));
            }
            Err(e) => {
                error!("compression task panicked for {}: {}", source.name, e);
                images.push(CompressedImage::passthrough(source, constraints.max_size_bytes));
                statuses.push(ItemStatus::Fallback(format!("task failure: {e}")));
            }
        }
    }

    BatchResult { images, statuses }
}
