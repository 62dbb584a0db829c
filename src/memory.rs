//! # In-Memory Store Doubles
//!
//! `HashMap`-backed implementations of [`BlobStore`] and [`MetadataStore`]
//! for tests and local development. Both carry failure-injection toggles so
//! form-handler integration tests can exercise partial-failure paths
//! (failed uploads, failed blob deletes, failed metadata inserts) without a
//! real backend.

use crate::error::StoreError;
use crate::store::{
    BlobStore, ListingId, MetadataStore, NewImageRecord, ParentKey, RecordId, StoredImageRecord,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

/// In-memory blob store issuing URLs under a fixed public base
pub struct InMemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    public_base: String,
    fail_puts: AtomicBool,
    fail_next_put: AtomicBool,
    fail_deletes: AtomicBool,
}

impl InMemoryBlobStore {
    pub fn new(public_base: impl Into<String>) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            public_base: public_base.into(),
            fail_puts: AtomicBool::new(false),
            fail_next_put: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent `put` fail
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Make exactly the next `put` fail
    pub fn fail_next_put(&self) {
        self.fail_next_put.store(true, Ordering::SeqCst);
    }

    /// Make every subsequent `delete` fail
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<String, StoreError> {
        if self.fail_puts.load(Ordering::SeqCst) || self.fail_next_put.swap(false, Ordering::SeqCst)
        {
            return Err(StoreError::new(format!("injected put failure for {path}")));
        }

        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(path) {
            return Err(StoreError::new(format!("object already exists at {path}")));
        }
        objects.insert(path.to_string(), bytes.to_vec());
        Ok(format!("{}/{}", self.public_base, path))
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::new(format!(
                "injected delete failure for {path}"
            )));
        }

        match self.objects.lock().unwrap().remove(path) {
            Some(_) => Ok(()),
            None => Err(StoreError::new(format!("no object at {path}"))),
        }
    }
}

/// In-memory metadata store: image rows plus a listing-slug registry
pub struct InMemoryMetadataStore {
    records: Mutex<HashMap<i64, StoredImageRecord>>,
    listing_slugs: Mutex<HashMap<String, ListingId>>,
    next_id: AtomicI64,
    fail_inserts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            listing_slugs: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            fail_inserts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    /// Seed the slug registry with a listing's current identifier
    pub fn register_slug(&self, slug: impl Into<String>, listing: ListingId) {
        self.listing_slugs
            .lock()
            .unwrap()
            .insert(slug.into(), listing);
    }

    /// Make every subsequent `insert` fail
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `delete` fail
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn get(&self, id: RecordId) -> Option<StoredImageRecord> {
        self.records.lock().unwrap().get(&id.0).cloned()
    }
}

impl Default for InMemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn insert(&self, record: NewImageRecord) -> Result<RecordId, StoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::new("injected insert failure"));
        }

        let id = RecordId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.records.lock().unwrap().insert(
            id.0,
            StoredImageRecord {
                id,
                parent: record.parent,
                url: record.url,
                path: record.path,
                order: record.order,
            },
        );
        Ok(id)
    }

    async fn delete(&self, id: RecordId) -> Result<(), StoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::new(format!(
                "injected delete failure for record {}",
                id.0
            )));
        }

        match self.records.lock().unwrap().remove(&id.0) {
            Some(_) => Ok(()),
            None => Err(StoreError::new(format!("no image record {}", id.0))),
        }
    }

    async fn update_parent(&self, id: RecordId, parent: &ParentKey) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::new(format!("no image record {}", id.0)))?;
        record.parent = parent.clone();
        Ok(())
    }

    async fn update_order(&self, id: RecordId, order: u32) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::new(format!("no image record {}", id.0)))?;
        record.order = order;
        Ok(())
    }

    async fn list_by_parent(&self, parent: &ParentKey) -> Result<Vec<StoredImageRecord>, StoreError> {
        let mut rows: Vec<StoredImageRecord> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| &r.parent == parent)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.order);
        Ok(rows)
    }

    async fn slug_exists(&self, slug: &str, exclude: Option<ListingId>) -> Result<bool, StoreError> {
        Ok(self
            .listing_slugs
            .lock()
            .unwrap()
            .get(slug)
            .map_or(false, |owner| exclude != Some(*owner)))
    }
}
