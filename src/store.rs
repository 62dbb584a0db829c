//! # Storage Collaborator Interfaces
//!
//! Traits and records for the two external stores the pipeline writes to:
//! a durable blob store (objects addressed by path, issuing stable public
//! URLs) and a relational metadata store holding one row per stored image.
//!
//! The real implementations live in the backend layer; this crate only
//! defines the seams and ships in-memory doubles (see [`crate::memory`])
//! for tests.
//!
//! ## Invariants carried by these types:
//! - Per parent, `StoredImageRecord::order` values are exactly `{0..n-1}`,
//!   no gaps or duplicates.
//! - Every stored URL under a listing's prefix corresponds to exactly one
//!   live record; transient inconsistency is permitted only during partial
//!   failure, and the lifecycle layer minimizes it.

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A listing's public identifier (slug), used as the storage-path
/// namespace for every image belonging to it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentKey(String);

impl ParentKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage path for an object under this listing's prefix
    pub fn object_path(&self, name: &str) -> String {
        format!("{}/{}", self.0, name)
    }
}

impl fmt::Display for ParentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Database identifier of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListingId(pub i64);

/// Database identifier of a stored image row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub i64);

/// A persisted image row, owned by its parent listing (cascade on delete).
///
/// `path` is the blob-store key the object was written under; `url` is the
/// public URL issued for it. Both are kept so deletes can address the blob
/// without parsing URLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredImageRecord {
    pub id: RecordId,
    pub parent: ParentKey,
    pub url: String,
    pub path: String,
    /// Zero-based, contiguous-per-parent display position
    pub order: u32,
}

/// Insert payload for a new image row
#[derive(Debug, Clone)]
pub struct NewImageRecord {
    pub parent: ParentKey,
    pub url: String,
    pub path: String,
    pub order: u32,
}

/// Durable object storage addressed by path
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write an object and return its stable public URL.
    ///
    /// Implementations must not silently overwrite an existing object.
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<String, StoreError>;

    /// Delete an object
    async fn delete(&self, path: &str) -> Result<(), StoreError>;
}

/// Relational metadata for stored images and listing slugs
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a new image row and return its id
    async fn insert(&self, record: NewImageRecord) -> Result<RecordId, StoreError>;

    /// Delete an image row
    async fn delete(&self, id: RecordId) -> Result<(), StoreError>;

    /// Move an image row to a new parent key (metadata-only re-keying)
    async fn update_parent(&self, id: RecordId, parent: &ParentKey) -> Result<(), StoreError>;

    /// Update an image row's display position
    async fn update_order(&self, id: RecordId, order: u32) -> Result<(), StoreError>;

    /// All image rows under a parent, sorted by `order`
    async fn list_by_parent(&self, parent: &ParentKey) -> Result<Vec<StoredImageRecord>, StoreError>;

    /// Whether a listing slug is already taken, optionally excluding one
    /// listing (the entity being edited) from the check
    async fn slug_exists(&self, slug: &str, exclude: Option<ListingId>) -> Result<bool, StoreError>;
}
