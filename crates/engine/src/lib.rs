pub mod config;
pub mod error;
pub mod reconcile;
pub mod scheduler;
pub mod update;

pub use config::{EngineConfig, OmittedFields};
pub use error::EngineError;
pub use reconcile::PassReport;
pub use scheduler::{ReconcilerHandle, spawn_reconciler};
pub use update::EditOutcome;

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use fieldline_core::{Actor, Clock, Model, ModelId, Record, RecordId, RecordUpdate};
use fieldline_storage::{ModelCatalog, RecordStore, StorageError};

/// Applies edits to records and promotes due future changes.
///
/// Every write is an optimistic read-merge-replace: the record is loaded,
/// the new state computed, and the store asked to replace it only if nobody
/// else wrote in between. On conflict the whole cycle is retried.
pub struct Engine<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    actor: Actor,
    config: EngineConfig,
}

impl<S: RecordStore> Engine<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            store,
            clock,
            actor: Actor::system(),
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    // ========================================================================
    // Update Processor
    // ========================================================================

    /// Create a new record from an edit batch.
    pub fn create_record(&self, update: &RecordUpdate) -> Result<Record, EngineError> {
        let now = self.clock.now();
        let data = update::initial_data(update, now, &self.actor);
        let record = Record::new(update.model_id, update.model_name.clone(), data, now);
        self.store.insert_record(&record)?;
        info!(record_id = %record.id, model = %record.model_name, "Created record");
        Ok(record)
    }

    /// Merge an edit batch into an existing record and persist the result.
    pub fn update_record(
        &self,
        record_id: RecordId,
        update: &RecordUpdate,
    ) -> Result<Record, EngineError> {
        let omitted = self.config.omitted_fields;
        self.write_loop(record_id, None, |existing, now, actor| {
            Some(update::merge_update(existing, update, omitted, now, actor))
        })?
        .ok_or_else(|| EngineError::RecordNotFound(record_id.to_string()))
    }

    // ========================================================================
    // Reconciler
    // ========================================================================

    /// Run one reconciliation pass over every record.
    ///
    /// A failure on one record is logged and counted; the pass moves on to the
    /// next record. Only a failure to enumerate records fails the pass.
    pub fn reconcile_once(&self) -> Result<PassReport, EngineError> {
        let started_at = self.clock.now();
        let mut report = PassReport::new(started_at);

        for record_id in self.store.list_record_ids()? {
            report.scanned += 1;
            match self.reconcile_record(record_id, started_at) {
                Ok(0) => {}
                Ok(promoted) => {
                    report.promoted_records += 1;
                    report.promoted_fields += promoted;
                }
                Err(e) => {
                    report.failures += 1;
                    warn!(%record_id, error = %e, "Failed to reconcile record");
                }
            }
        }

        debug!(
            scanned = report.scanned,
            promoted_records = report.promoted_records,
            promoted_fields = report.promoted_fields,
            failures = report.failures,
            "Reconciliation pass finished"
        );
        Ok(report)
    }

    /// Promote due changes on one record as of `now`. Returns the number of
    /// promoted fields; zero means nothing was written.
    pub fn reconcile_record(
        &self,
        record_id: RecordId,
        now: OffsetDateTime,
    ) -> Result<usize, EngineError> {
        let mut promoted = 0;
        self.write_loop(record_id, Some(now), |existing, now, actor| {
            let mut next = existing.clone();
            promoted = reconcile::promote_record(&mut next, now, actor);
            (promoted > 0).then_some(next)
        })?;
        Ok(promoted)
    }

    // ========================================================================
    // Read paths
    // ========================================================================

    pub fn get_record(&self, record_id: RecordId) -> Result<Record, EngineError> {
        self.store
            .load_record(record_id)?
            .ok_or_else(|| EngineError::RecordNotFound(record_id.to_string()))
    }

    pub fn list_records(&self) -> Result<Vec<Record>, EngineError> {
        Ok(self.store.list_records()?)
    }

    // ========================================================================
    // Optimistic write loop
    // ========================================================================

    /// Load, compute, replace; reload and recompute on version conflicts.
    /// `compute` returning `None` means there is nothing to write.
    /// Returns `Ok(None)` when nothing was written.
    fn write_loop<F>(
        &self,
        record_id: RecordId,
        fixed_now: Option<OffsetDateTime>,
        mut compute: F,
    ) -> Result<Option<Record>, EngineError>
    where
        F: FnMut(&Record, OffsetDateTime, &Actor) -> Option<Record>,
    {
        let attempts = self.config.max_write_attempts.max(1);
        for attempt in 1..=attempts {
            let existing = self
                .store
                .load_record(record_id)?
                .ok_or_else(|| EngineError::RecordNotFound(record_id.to_string()))?;
            let now = fixed_now.unwrap_or_else(|| self.clock.now());

            let Some(mut next) = compute(&existing, now, &self.actor) else {
                return Ok(None);
            };

            match self.store.replace_record(&next) {
                Ok(version) => {
                    next.version = version;
                    return Ok(Some(next));
                }
                Err(e) if e.is_version_conflict() => {
                    warn!(%record_id, attempt, error = %e, "Concurrent write detected, retrying");
                }
                Err(StorageError::NotFound(_)) => {
                    return Err(EngineError::RecordNotFound(record_id.to_string()));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::Conflict {
            record_id: record_id.to_string(),
            attempts,
        })
    }
}

impl<S: RecordStore + ModelCatalog> Engine<S> {
    pub fn load_model(&self, model_id: ModelId) -> Result<Model, EngineError> {
        self.store
            .load_model(model_id)?
            .ok_or_else(|| EngineError::ModelNotFound(model_id.to_string()))
    }

    /// Create a record with one empty field state per field of the model.
    pub fn create_blank_record(&self, model_id: ModelId) -> Result<Record, EngineError> {
        let model = self.load_model(model_id)?;
        let record = Record::new(
            model.id,
            model.name.clone(),
            model.blank_record_data(),
            self.clock.now(),
        );
        self.store.insert_record(&record)?;
        info!(record_id = %record.id, model = %model.name, "Created blank record");
        Ok(record)
    }
}
