use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use fieldline_core::{Model, ModelId, Record, RecordId};
use fieldline_storage::{ModelCatalog, RecordStore, StorageError};

type ReplaceHook<S> = Box<dyn FnOnce(&S) + Send>;

/// Wraps a store and injects failures or interleaved writes.
pub struct FaultyStore<S> {
    inner: Arc<S>,
    listing_outages: AtomicUsize,
    id_listings: AtomicUsize,
    unreadable: Mutex<HashSet<RecordId>>,
    unwritable: Mutex<HashSet<RecordId>>,
    before_replace: Mutex<VecDeque<ReplaceHook<S>>>,
    replace_calls: AtomicUsize,
}

impl<S> FaultyStore<S> {
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            listing_outages: AtomicUsize::new(0),
            id_listings: AtomicUsize::new(0),
            unreadable: Mutex::new(HashSet::new()),
            unwritable: Mutex::new(HashSet::new()),
            before_replace: Mutex::new(VecDeque::new()),
            replace_calls: AtomicUsize::new(0),
        }
    }

    /// Fail the next `count` calls to `list_record_ids`/`list_records`.
    pub fn fail_next_listings(&self, count: usize) {
        self.listing_outages.store(count, Ordering::SeqCst);
    }

    /// Every load of this record fails until [`FaultyStore::heal`] is called.
    pub fn make_unreadable(&self, record_id: RecordId) {
        self.unreadable.lock().insert(record_id);
    }

    /// Every replace of this record fails until [`FaultyStore::heal`] is called.
    pub fn fail_replace(&self, record_id: RecordId) {
        self.unwritable.lock().insert(record_id);
    }

    pub fn heal(&self, record_id: RecordId) {
        self.unreadable.lock().remove(&record_id);
        self.unwritable.lock().remove(&record_id);
    }

    /// Run `hook` against the inner store right before the next replace,
    /// simulating a writer that slipped in between our load and our replace.
    pub fn interleave_before_replace(&self, hook: impl FnOnce(&S) + Send + 'static) {
        self.before_replace.lock().push_back(Box::new(hook));
    }

    pub fn replace_calls(&self) -> usize {
        self.replace_calls.load(Ordering::SeqCst)
    }

    /// Calls to `list_record_ids`, failed ones included. One per reconciliation pass.
    pub fn id_listings(&self) -> usize {
        self.id_listings.load(Ordering::SeqCst)
    }

    fn take_listing_outage(&self) -> bool {
        self.listing_outages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl<S: RecordStore> RecordStore for FaultyStore<S> {
    fn insert_record(&self, record: &Record) -> Result<(), StorageError> {
        self.inner.insert_record(record)
    }

    fn load_record(&self, record_id: RecordId) -> Result<Option<Record>, StorageError> {
        if self.unreadable.lock().contains(&record_id) {
            return Err(StorageError::Serialization(format!(
                "record {record_id} is unreadable"
            )));
        }
        self.inner.load_record(record_id)
    }

    fn list_record_ids(&self) -> Result<Vec<RecordId>, StorageError> {
        self.id_listings.fetch_add(1, Ordering::SeqCst);
        if self.take_listing_outage() {
            return Err(StorageError::NotFound("records table unavailable".into()));
        }
        self.inner.list_record_ids()
    }

    fn list_records(&self) -> Result<Vec<Record>, StorageError> {
        if self.take_listing_outage() {
            return Err(StorageError::NotFound("records table unavailable".into()));
        }
        self.inner.list_records()
    }

    fn replace_record(&self, record: &Record) -> Result<u64, StorageError> {
        self.replace_calls.fetch_add(1, Ordering::SeqCst);
        if self.unwritable.lock().contains(&record.id) {
            return Err(StorageError::Serialization(format!(
                "record {}: disk full",
                record.id
            )));
        }
        let hook = self.before_replace.lock().pop_front();
        if let Some(hook) = hook {
            hook(self.inner.as_ref());
        }
        self.inner.replace_record(record)
    }
}

impl<S: ModelCatalog> ModelCatalog for FaultyStore<S> {
    fn insert_model(&self, model: &Model) -> Result<(), StorageError> {
        self.inner.insert_model(model)
    }

    fn update_model(&self, model: &Model) -> Result<(), StorageError> {
        self.inner.update_model(model)
    }

    fn load_model(&self, model_id: ModelId) -> Result<Option<Model>, StorageError> {
        self.inner.load_model(model_id)
    }

    fn list_models(&self) -> Result<Vec<Model>, StorageError> {
        self.inner.list_models()
    }
}
