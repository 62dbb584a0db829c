//! # Asset Lifecycle Module
//!
//! Reconciles a listing's stored image set against the desired end state
//! of an edit: removals, newly compressed additions, display ordering and
//! re-keying when the listing's public identifier changes.
//!
//! ## Execution order (bounds the damage of partial failure):
//! 1. **Validate cardinality** - a violation aborts before any mutation
//! 2. **Resolve the target key** - read-only; slug exhaustion aborts
//!    before any mutation
//! 3. **Delete removals** - metadata row first, then best-effort blob
//!    delete; a dangling blob is a recoverable leak, a dangling row is a
//!    user-visible broken image
//! 4. **Re-key survivors** - metadata-only, before any upload, so new and
//!    old images share one namespace; blobs are not moved
//! 5. **Compact ordering** - survivors renumbered to `0..k-1`
//! 6. **Upload additions** - orders continue from `k`, advancing only on
//!    success; a failed insert after a successful blob write rolls the
//!    blob back so no orphan is left behind
//!
//! Per-item upload/delete failures are logged and counted into the
//! outcome ("N of M photos saved"); precondition failures (cardinality,
//! slug exhaustion) are hard errors because no consistent result exists.
//!
//! The storage namespace under one parent key is only ever written by one
//! reconciliation at a time; there is no lock, concurrent editors of the
//! same listing are not supported.

use crate::compressor::CompressedImage;
use crate::error::PipelineError;
use crate::slug;
use crate::store::{
    BlobStore, ListingId, MetadataStore, NewImageRecord, ParentKey, RecordId, StoredImageRecord,
};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

/// Minimum photos a listing must keep
pub const MIN_IMAGES_PER_LISTING: usize = 1;

/// Maximum photos a listing may hold
pub const MAX_IMAGES_PER_LISTING: usize = 5;

/// The listing whose images are being reconciled
#[derive(Debug, Clone)]
pub struct ListingRef {
    pub id: ListingId,
    /// Current public identifier (slug)
    pub key: ParentKey,
}

/// Desired end state of one edit/create session
#[derive(Debug)]
pub struct ReconcileRequest {
    /// Image rows currently stored for the listing
    pub existing: Vec<StoredImageRecord>,
    /// Rows the user removed in the form
    pub removed_ids: Vec<RecordId>,
    /// Freshly compressed images to add
    pub new_images: Vec<CompressedImage>,
    /// Set when the title changed in this same edit; triggers re-keying
    pub new_title: Option<String>,
}

/// Aggregate result of a reconciliation.
///
/// Callers should report the counts ("N of M photos saved") rather than a
/// single pass/fail boolean.
#[derive(Debug)]
pub struct ReconcileOutcome {
    /// Surviving rows plus successful additions, orders contiguous `0..n-1`
    pub records: Vec<StoredImageRecord>,
    /// The listing's key after reconciliation (new slug if re-keyed)
    pub parent_key: ParentKey,
    pub uploaded: usize,
    pub upload_failures: usize,
    pub removed: usize,
    pub delete_failures: usize,
}

impl ReconcileOutcome {
    /// True when at least one per-item operation failed
    pub fn is_partial(&self) -> bool {
        self.upload_failures > 0 || self.delete_failures > 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{} of {} new photos saved | {} removed | {} kept | {} failures",
            self.uploaded,
            self.uploaded + self.upload_failures,
            self.removed,
            self.records.len() - self.uploaded,
            self.upload_failures + self.delete_failures,
        )
    }
}

/// Orchestrates blob and metadata mutations for one listing's image set
pub struct AssetLifecycleManager {
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
}

impl AssetLifecycleManager {
    pub fn new(blobs: Arc<dyn BlobStore>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self { blobs, metadata }
    }

    /// Converge the listing's stored image set to the requested state.
    ///
    /// Idempotent for a no-op request (no removals, no additions, no
    /// retitle): the input records come back unchanged and nothing is
    /// written.
    ///
    /// # Errors
    /// - [`PipelineError::Cardinality`] when the surviving set would fall
    ///   outside `[MIN_IMAGES_PER_LISTING, MAX_IMAGES_PER_LISTING]`
    /// - [`PipelineError::SlugExhausted`] when no free identifier exists
    ///   for the new title
    /// - [`PipelineError::Metadata`] when re-keying or renumbering fails
    ///
    /// Per-item upload/delete failures do not error; they are counted in
    /// the returned [`ReconcileOutcome`].
    pub async fn reconcile(
        &self,
        listing: &ListingRef,
        request: ReconcileRequest,
    ) -> Result<ReconcileOutcome, PipelineError> {
        let removed_set: HashSet<RecordId> = request.removed_ids.iter().copied().collect();

        // 1. cardinality precondition, checked before anything is touched
        let matching_removals = request
            .existing
            .iter()
            .filter(|r| removed_set.contains(&r.id))
            .count();
        let resulting = request.existing.len() - matching_removals + request.new_images.len();
        if !(MIN_IMAGES_PER_LISTING..=MAX_IMAGES_PER_LISTING).contains(&resulting) {
            return Err(PipelineError::Cardinality {
                min: MIN_IMAGES_PER_LISTING,
                max: MAX_IMAGES_PER_LISTING,
                actual: resulting,
            });
        }

        // 2. resolve the target key while everything is still read-only
        let target_key = self.resolve_target_key(listing, request.new_title.as_deref()).await?;

        // 3. removals: metadata row first, blob best-effort
        let mut uploaded = 0;
        let mut upload_failures = 0;
        let mut removed = 0;
        let mut delete_failures = 0;
        let mut survivors = Vec::with_capacity(request.existing.len());

        for record in request.existing {
            if !removed_set.contains(&record.id) {
                survivors.push(record);
                continue;
            }

            match self.metadata.delete(record.id).await {
                Ok(()) => {
                    removed += 1;
                    if let Err(e) = self.blobs.delete(&record.path).await {
                        warn!(
                            "blob delete failed for {} (leaked object): {}",
                            record.path, e
                        );
                        delete_failures += 1;
                    }
                }
                Err(e) => {
                    // the row still exists, so the image is still live
                    error!("metadata delete failed for image {}: {}", record.id.0, e);
                    delete_failures += 1;
                    survivors.push(record);
                }
            }
        }

        // 4. re-key survivors before any upload lands
        if target_key != listing.key {
            info!(
                "re-keying {} surviving photos from {} to {}",
                survivors.len(),
                listing.key,
                target_key
            );
            for record in &mut survivors {
                self.metadata.update_parent(record.id, &target_key).await?;
                record.parent = target_key.clone();
            }
        }

        // 5. compact display ordering to 0..k-1
        survivors.sort_by_key(|r| r.order);
        for (index, record) in survivors.iter_mut().enumerate() {
            let order = index as u32;
            if record.order != order {
                self.metadata.update_order(record.id, order).await?;
                record.order = order;
            }
        }

        // 6. uploads continue the ordering, advancing only on success
        let mut next_order = survivors.len() as u32;
        for (sequence, image) in request.new_images.iter().enumerate() {
            let path = target_key.object_path(&object_name(&image.bytes, sequence));

            let url = match self.blobs.put(&path, &image.bytes).await {
                Ok(url) => url,
                Err(e) => {
                    warn!("upload failed for {}: {}", path, e);
                    upload_failures += 1;
                    continue;
                }
            };

            let record = NewImageRecord {
                parent: target_key.clone(),
                url: url.clone(),
                path: path.clone(),
                order: next_order,
            };
            match self.metadata.insert(record).await {
                Ok(id) => {
                    survivors.push(StoredImageRecord {
                        id,
                        parent: target_key.clone(),
                        url,
                        path,
                        order: next_order,
                    });
                    next_order += 1;
                    uploaded += 1;
                }
                Err(e) => {
                    error!(
                        "metadata insert failed for {}: {}, rolling back blob",
                        path, e
                    );
                    if let Err(rollback) = self.blobs.delete(&path).await {
                        warn!(
                            "rollback delete failed for {} (leaked object): {}",
                            path, rollback
                        );
                    }
                    upload_failures += 1;
                }
            }
        }

        let outcome = ReconcileOutcome {
            records: survivors,
            parent_key: target_key,
            uploaded,
            upload_failures,
            removed,
            delete_failures,
        };
        info!("reconciled listing {}: {}", listing.id.0, outcome.summary());
        Ok(outcome)
    }

    /// Resolve the key new and surviving images will live under.
    ///
    /// Read-only: a slug collision search that exhausts its retry bound
    /// aborts the reconciliation before any mutation has happened.
    async fn resolve_target_key(
        &self,
        listing: &ListingRef,
        new_title: Option<&str>,
    ) -> Result<ParentKey, PipelineError> {
        let Some(title) = new_title else {
            return Ok(listing.key.clone());
        };

        let candidate = slug::slugify(title);
        if candidate == listing.key.as_str() {
            return Ok(listing.key.clone());
        }

        let unique =
            slug::ensure_unique(self.metadata.as_ref(), &candidate, Some(listing.id)).await?;
        Ok(ParentKey::new(unique))
    }
}

/// Storage object name for a new upload: unique per upload via timestamp
/// and batch sequence, with a short content digest for traceability.
/// Collisions must not silently overwrite, so uniqueness never relies on
/// content alone.
fn object_name(bytes: &[u8], sequence: usize) -> String {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hex::encode(hasher.finalize());

    format!("{}-{}-{}.jpg", stamp, sequence, &digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryBlobStore, InMemoryMetadataStore};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .try_init();
    }

    fn new_image(tag: u8) -> CompressedImage {
        CompressedImage {
            bytes: vec![tag; 64],
            mime: "image/jpeg".to_string(),
            dimensions: Some((64, 64)),
            quality: 0.8,
            within_budget: true,
        }
    }

    struct Fixture {
        blobs: Arc<InMemoryBlobStore>,
        metadata: Arc<InMemoryMetadataStore>,
        manager: AssetLifecycleManager,
    }

    impl Fixture {
        fn new() -> Self {
            init_tracing();
            let blobs = Arc::new(InMemoryBlobStore::new("https://cdn.test"));
            let metadata = Arc::new(InMemoryMetadataStore::new());
            let manager =
                AssetLifecycleManager::new(blobs.clone() as Arc<dyn BlobStore>, metadata.clone());
            Self {
                blobs,
                metadata,
                manager,
            }
        }

        /// Seed a listing with `count` consistent blob + metadata pairs
        async fn seed(&self, listing: &ListingRef, count: usize) -> Vec<StoredImageRecord> {
            self.metadata
                .register_slug(listing.key.as_str().to_string(), listing.id);

            let mut records = Vec::with_capacity(count);
            for i in 0..count {
                let path = listing.key.object_path(&format!("seed-{i}.jpg"));
                let url = self.blobs.put(&path, &[i as u8; 32]).await.unwrap();
                let id = self
                    .metadata
                    .insert(NewImageRecord {
                        parent: listing.key.clone(),
                        url: url.clone(),
                        path: path.clone(),
                        order: i as u32,
                    })
                    .await
                    .unwrap();
                records.push(StoredImageRecord {
                    id,
                    parent: listing.key.clone(),
                    url,
                    path,
                    order: i as u32,
                });
            }
            records
        }
    }

    fn listing(id: i64, key: &str) -> ListingRef {
        ListingRef {
            id: ListingId(id),
            key: ParentKey::new(key),
        }
    }

    fn assert_contiguous(records: &[StoredImageRecord]) {
        let mut orders: Vec<u32> = records.iter().map(|r| r.order).collect();
        orders.sort_unstable();
        let expected: Vec<u32> = (0..records.len() as u32).collect();
        assert_eq!(orders, expected);
    }

    #[tokio::test]
    async fn test_noop_reconcile_is_idempotent() {
        let fx = Fixture::new();
        let listing = listing(1, "red-bike");
        let existing = fx.seed(&listing, 3).await;

        let outcome = fx
            .manager
            .reconcile(
                &listing,
                ReconcileRequest {
                    existing: existing.clone(),
                    removed_ids: vec![],
                    new_images: vec![],
                    new_title: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.records, existing);
        assert_eq!(outcome.parent_key, listing.key);
        assert!(!outcome.is_partial());
        assert_eq!(fx.blobs.object_count(), 3);
        assert_eq!(fx.metadata.record_count(), 3);
    }

    #[tokio::test]
    async fn test_remove_one_add_two_yields_contiguous_orders() {
        let fx = Fixture::new();
        let listing = listing(2, "oak-table");
        let existing = fx.seed(&listing, 4).await;
        let removed = existing[1].clone();

        let outcome = fx
            .manager
            .reconcile(
                &listing,
                ReconcileRequest {
                    existing,
                    removed_ids: vec![removed.id],
                    new_images: vec![new_image(10), new_image(11)],
                    new_title: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.records.len(), 5);
        assert_contiguous(&outcome.records);
        assert_eq!(outcome.removed, 1);
        assert_eq!(outcome.uploaded, 2);
        assert!(!outcome.is_partial());

        // removed image is gone from both stores
        assert!(fx.metadata.get(removed.id).is_none());
        assert!(!fx.blobs.contains(&removed.path));
        assert_eq!(fx.blobs.object_count(), 5);
        assert_eq!(fx.metadata.record_count(), 5);
    }

    #[tokio::test]
    async fn test_cardinality_violation_mutates_nothing() {
        let fx = Fixture::new();
        let listing = listing(3, "full-listing");
        let existing = fx.seed(&listing, 5).await;

        let result = fx
            .manager
            .reconcile(
                &listing,
                ReconcileRequest {
                    existing,
                    removed_ids: vec![],
                    new_images: vec![new_image(1)],
                    new_title: None,
                },
            )
            .await;

        assert!(matches!(
            result,
            Err(PipelineError::Cardinality { actual: 6, .. })
        ));
        assert_eq!(fx.blobs.object_count(), 5);
        assert_eq!(fx.metadata.record_count(), 5);
    }

    #[tokio::test]
    async fn test_removing_last_image_violates_minimum() {
        let fx = Fixture::new();
        let listing = listing(4, "lone-photo");
        let existing = fx.seed(&listing, 1).await;
        let only = existing[0].id;

        let result = fx
            .manager
            .reconcile(
                &listing,
                ReconcileRequest {
                    existing,
                    removed_ids: vec![only],
                    new_images: vec![],
                    new_title: None,
                },
            )
            .await;

        assert!(matches!(
            result,
            Err(PipelineError::Cardinality { actual: 0, .. })
        ));
        assert_eq!(fx.metadata.record_count(), 1);
    }

    #[tokio::test]
    async fn test_title_change_rekeys_survivors_and_new_uploads() {
        let fx = Fixture::new();
        let listing = listing(5, "old-lamp");
        let existing = fx.seed(&listing, 2).await;

        let outcome = fx
            .manager
            .reconcile(
                &listing,
                ReconcileRequest {
                    existing,
                    removed_ids: vec![],
                    new_images: vec![new_image(20)],
                    new_title: Some("Vintage Brass Lamp".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.parent_key.as_str(), "vintage-brass-lamp");
        for record in &outcome.records {
            assert_eq!(record.parent, outcome.parent_key);
        }
        // survivors keep their blob paths, only the new upload lands
        // under the new prefix
        let new_record = outcome.records.iter().find(|r| r.order == 2).unwrap();
        assert!(new_record.path.starts_with("vintage-brass-lamp/"));
        assert_contiguous(&outcome.records);

        // the store agrees with the returned set
        let listed = fx
            .metadata
            .list_by_parent(&outcome.parent_key)
            .await
            .unwrap();
        assert_eq!(listed.len(), 3);
    }

    #[tokio::test]
    async fn test_title_change_with_taken_slug_gets_suffix() {
        let fx = Fixture::new();
        let listing = listing(6, "old-lamp");
        let existing = fx.seed(&listing, 1).await;
        fx.metadata.register_slug("vintage-brass-lamp", ListingId(99));

        let outcome = fx
            .manager
            .reconcile(
                &listing,
                ReconcileRequest {
                    existing,
                    removed_ids: vec![],
                    new_images: vec![],
                    new_title: Some("Vintage Brass Lamp".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.parent_key.as_str(), "vintage-brass-lamp-1");
    }

    #[tokio::test]
    async fn test_unchanged_title_does_not_collide_with_itself() {
        let fx = Fixture::new();
        let listing = listing(7, "vintage-brass-lamp");
        let existing = fx.seed(&listing, 1).await;

        let outcome = fx
            .manager
            .reconcile(
                &listing,
                ReconcileRequest {
                    existing: existing.clone(),
                    removed_ids: vec![],
                    new_images: vec![],
                    new_title: Some("Vintage Brass Lamp".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.parent_key, listing.key);
        assert_eq!(outcome.records, existing);
    }

    #[tokio::test]
    async fn test_partial_upload_failure_surfaces_counts() {
        let fx = Fixture::new();
        let listing = listing(8, "patio-set");
        let existing = fx.seed(&listing, 1).await;
        fx.blobs.set_fail_puts(true);

        let outcome = fx
            .manager
            .reconcile(
                &listing,
                ReconcileRequest {
                    existing,
                    removed_ids: vec![],
                    new_images: vec![new_image(30), new_image(31)],
                    new_title: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.uploaded, 0);
        assert_eq!(outcome.upload_failures, 2);
        assert!(outcome.is_partial());
        assert_eq!(outcome.records.len(), 1);
        assert_contiguous(&outcome.records);
        assert_eq!(outcome.summary(), "0 of 2 new photos saved | 0 removed | 1 kept | 2 failures");
    }

    #[tokio::test]
    async fn test_insert_failure_rolls_back_blob() {
        let fx = Fixture::new();
        let listing = listing(9, "ski-boots");
        let existing = fx.seed(&listing, 1).await;
        fx.metadata.set_fail_inserts(true);

        let outcome = fx
            .manager
            .reconcile(
                &listing,
                ReconcileRequest {
                    existing,
                    removed_ids: vec![],
                    new_images: vec![new_image(40)],
                    new_title: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.uploaded, 0);
        assert_eq!(outcome.upload_failures, 1);
        // no orphaned blob: the rolled-back object is gone
        assert_eq!(fx.blobs.object_count(), 1);
    }

    #[tokio::test]
    async fn test_blob_delete_failure_is_tolerated() {
        let fx = Fixture::new();
        let listing = listing(10, "book-shelf");
        let existing = fx.seed(&listing, 2).await;
        let removed = existing[0].clone();
        fx.blobs.set_fail_deletes(true);

        let outcome = fx
            .manager
            .reconcile(
                &listing,
                ReconcileRequest {
                    existing,
                    removed_ids: vec![removed.id],
                    new_images: vec![],
                    new_title: None,
                },
            )
            .await
            .unwrap();

        // metadata row is gone, the leaked blob is only counted
        assert_eq!(outcome.removed, 1);
        assert_eq!(outcome.delete_failures, 1);
        assert!(fx.metadata.get(removed.id).is_none());
        assert!(fx.blobs.contains(&removed.path));
        assert_contiguous(&outcome.records);
    }

    #[tokio::test]
    async fn test_metadata_delete_failure_keeps_record_live() {
        let fx = Fixture::new();
        let listing = listing(12, "garden-tools");
        let existing = fx.seed(&listing, 3).await;
        let doomed = existing[0].clone();
        fx.metadata.set_fail_deletes(true);

        let outcome = fx
            .manager
            .reconcile(
                &listing,
                ReconcileRequest {
                    existing,
                    removed_ids: vec![doomed.id],
                    new_images: vec![],
                    new_title: None,
                },
            )
            .await
            .unwrap();

        // the row could not be deleted, so the image must stay live
        assert_eq!(outcome.removed, 0);
        assert_eq!(outcome.delete_failures, 1);
        assert!(outcome.is_partial());
        assert_eq!(outcome.records.len(), 3);
        assert!(outcome.records.iter().any(|r| r.id == doomed.id));
        assert_contiguous(&outcome.records);

        // both stores are untouched
        assert!(fx.metadata.get(doomed.id).is_some());
        assert!(fx.blobs.contains(&doomed.path));
    }

    #[tokio::test]
    async fn test_slug_exhaustion_aborts_before_any_mutation() {
        let fx = Fixture::new();
        let listing = listing(13, "old-lamp");
        let existing = fx.seed(&listing, 2).await;
        let removed = existing[0].id;

        // every candidate the resolver will try is already taken
        fx.metadata.register_slug("garden-chair", ListingId(99));
        for n in 1..1000u32 {
            fx.metadata
                .register_slug(format!("garden-chair-{n}"), ListingId(99));
        }

        let result = fx
            .manager
            .reconcile(
                &listing,
                ReconcileRequest {
                    existing,
                    removed_ids: vec![removed],
                    new_images: vec![new_image(60)],
                    new_title: Some("Garden Chair".to_string()),
                },
            )
            .await;

        assert!(matches!(
            result,
            Err(PipelineError::SlugExhausted { attempts: 1000, .. })
        ));

        // the requested removal and upload never ran
        assert!(fx.metadata.get(removed).is_some());
        assert_eq!(fx.metadata.record_count(), 2);
        assert_eq!(fx.blobs.object_count(), 2);
    }

    #[tokio::test]
    async fn test_upload_failure_keeps_orders_contiguous() {
        let fx = Fixture::new();
        let listing = listing(11, "mixed-luck");
        let existing = fx.seed(&listing, 2).await;

        // first put fails, the second succeeds
        fx.blobs.fail_next_put();

        let outcome = fx
            .manager
            .reconcile(
                &listing,
                ReconcileRequest {
                    existing,
                    removed_ids: vec![],
                    new_images: vec![new_image(50), new_image(51)],
                    new_title: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.uploaded, 1);
        assert_eq!(outcome.upload_failures, 1);
        assert_eq!(outcome.records.len(), 3);
        assert_contiguous(&outcome.records);
    }

    #[test]
    fn test_object_names_differ_by_sequence() {
        let bytes = vec![1u8; 16];
        let a = object_name(&bytes, 0);
        let b = object_name(&bytes, 1);
        assert_ne!(a, b);
        assert!(a.ends_with(".jpg"));
    }
}
