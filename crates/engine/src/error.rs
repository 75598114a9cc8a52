use fieldline_core::CoreError;
use fieldline_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("record not found: {0}")]
    RecordNotFound(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// Reserved for collaborators that enforce field types and required flags.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("record {record_id} kept changing underneath us after {attempts} attempts")]
    Conflict { record_id: String, attempts: u32 },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("reconciler task failed: {0}")]
    Task(String),
}
