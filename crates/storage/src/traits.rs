use fieldline_core::{Model, ModelId, Record, RecordId};

use crate::error::StorageError;

/// Persistence for records. Every write replaces the whole record.
pub trait RecordStore: Send + Sync {
    /// Store a new record as-is, including its `version`.
    fn insert_record(&self, record: &Record) -> Result<(), StorageError>;

    fn load_record(&self, record_id: RecordId) -> Result<Option<Record>, StorageError>;

    /// Ids of every stored record, in a stable order.
    fn list_record_ids(&self) -> Result<Vec<RecordId>, StorageError>;

    fn list_records(&self) -> Result<Vec<Record>, StorageError>;

    /// Replace the stored record if its stored version still equals
    /// `record.version`. Returns the new version.
    ///
    /// Fails with `VersionConflict` when another writer got there first and
    /// with `NotFound` when the record does not exist.
    fn replace_record(&self, record: &Record) -> Result<u64, StorageError>;
}

/// Read/write access to model definitions. The engine only reads.
pub trait ModelCatalog: Send + Sync {
    fn insert_model(&self, model: &Model) -> Result<(), StorageError>;

    fn update_model(&self, model: &Model) -> Result<(), StorageError>;

    fn load_model(&self, model_id: ModelId) -> Result<Option<Model>, StorageError>;

    fn list_models(&self) -> Result<Vec<Model>, StorageError>;
}
