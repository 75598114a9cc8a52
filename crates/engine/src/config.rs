use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// What happens to stored fields that an edit batch does not mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OmittedFields {
    /// The record keeps only the fields present in the batch.
    #[default]
    Drop,
    /// Untouched fields are carried forward unchanged.
    Retain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Delay between the end of one reconciliation pass and the start of the next.
    #[serde(default = "default_reconcile_interval_ms")]
    pub reconcile_interval_ms: u64,

    /// Read-merge-replace attempts before a write gives up on version conflicts.
    #[serde(default = "default_max_write_attempts")]
    pub max_write_attempts: u32,

    #[serde(default)]
    pub omitted_fields: OmittedFields,
}

fn default_reconcile_interval_ms() -> u64 {
    5 * 60 * 1000
}

fn default_max_write_attempts() -> u32 {
    5
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_ms: default_reconcile_interval_ms(),
            max_write_attempts: default_max_write_attempts(),
            omitted_fields: OmittedFields::default(),
        }
    }
}

impl EngineConfig {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_omitted_fields(mut self, policy: OmittedFields) -> Self {
        self.omitted_fields = policy;
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.reconcile_interval_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "reconcile_interval_ms must be greater than zero".into(),
            ));
        }
        if self.max_write_attempts == 0 {
            return Err(EngineError::InvalidConfig(
                "max_write_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
