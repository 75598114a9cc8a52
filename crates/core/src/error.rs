use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("invalid effective date: {0}")]
    InvalidEffectiveDate(String),
}
