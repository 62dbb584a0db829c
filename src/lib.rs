//! # Listing Asset Pipeline
//!
//! Image handling for marketplace listing forms: adaptive client-side
//! compression plus lifecycle management of the stored image set.
//!
//! ## Module architecture:
//! - `config`: compression constraints and validation
//! - `error`: custom error types for the pipeline
//! - `encoder`: pure resize + JPEG re-encode layer
//! - `compressor`: adaptive quality convergence for a single image
//! - `batch`: order-preserving fan-out with per-item failure isolation
//! - `store`: collaborator traits for the blob and metadata stores
//! - `memory`: in-memory store doubles with failure injection
//! - `slug`: public identifier derivation and collision handling
//! - `lifecycle`: reconciliation of a listing's stored image set
//!
//! ## Usage:
//! ```no_run
//! use listing_asset_pipeline::{
//!     compress_all, AssetLifecycleManager, CompressionConstraints, ListingRef,
//!     ReconcileRequest, SourceImage,
//! };
//! # async fn save(
//! #     manager: AssetLifecycleManager,
//! #     listing: ListingRef,
//! #     files: Vec<SourceImage>,
//! # ) -> Result<(), listing_asset_pipeline::PipelineError> {
//! let constraints = CompressionConstraints::default();
//! let batch = compress_all(&files, &constraints).await;
//!
//! let outcome = manager
//!     .reconcile(
//!         &listing,
//!         ReconcileRequest {
//!             existing: vec![],
//!             removed_ids: vec![],
//!             new_images: batch.images,
//!             new_title: None,
//!         },
//!     )
//!     .await?;
//! println!("{}", outcome.summary());
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod compressor;
pub mod config;
pub mod encoder;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod slug;
pub mod store;

pub use batch::{compress_all, BatchResult, ItemStatus};
pub use compressor::{compress, CompressedImage, SourceImage};
pub use config::CompressionConstraints;
pub use error::{PipelineError, StoreError};
pub use lifecycle::{
    AssetLifecycleManager, ListingRef, ReconcileOutcome, ReconcileRequest,
    MAX_IMAGES_PER_LISTING, MIN_IMAGES_PER_LISTING,
};
pub use slug::{ensure_unique, slugify};
pub use store::{
    BlobStore, ListingId, MetadataStore, NewImageRecord, ParentKey, RecordId, StoredImageRecord,
};
