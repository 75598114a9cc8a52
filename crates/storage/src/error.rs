use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Collision(String),

    #[error("version conflict on record {record_id}: expected {expected}, found {actual}")]
    VersionConflict {
        record_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("core error: {0}")]
    Core(#[from] fieldline_core::CoreError),
}

impl StorageError {
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}
