//! Merging an edit batch into a record's field states.

use time::OffsetDateTime;
use tracing::debug;

use fieldline_core::{Actor, FieldEdit, FieldState, Record, RecordData, RecordUpdate};

use crate::config::OmittedFields;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// Immediate edit with the value already in force.
    Unchanged,
    /// Immediate edit that replaced the current value.
    Applied,
    /// Future edit queued; `replaced` if it displaced one for the same date.
    Scheduled { replaced: bool },
}

/// Apply one edit to one field state.
pub fn apply_edit(
    state: &mut FieldState,
    edit: &FieldEdit<'_>,
    now: OffsetDateTime,
    actor: &Actor,
) -> EditOutcome {
    state.name = edit.field_name.to_string();
    match edit.effective_date {
        None if state.apply_immediate(edit.new_value, now, actor) => EditOutcome::Applied,
        None => EditOutcome::Unchanged,
        Some(effective_date) => EditOutcome::Scheduled {
            replaced: state.schedule(edit.new_value, effective_date, now, actor),
        },
    }
}

/// Field states for a record created from `update`. Immediate values become
/// the initial current value without history; dated values are queued.
pub fn initial_data(update: &RecordUpdate, now: OffsetDateTime, actor: &Actor) -> RecordData {
    let mut data = RecordData::new();
    for edit in update.edits() {
        let mut state = FieldState::new(edit.field_name);
        match edit.effective_date {
            None => state.current_value = edit.new_value.to_string(),
            Some(effective_date) => {
                state.schedule(edit.new_value, effective_date, now, actor);
            }
        }
        data.entry(edit.category_id.to_string())
            .or_default()
            .insert(edit.field_id.to_string(), state);
    }
    data
}

/// Next state of `existing` after applying `update`. The returned record
/// still carries the version it was loaded at.
pub fn merge_update(
    existing: &Record,
    update: &RecordUpdate,
    omitted: OmittedFields,
    now: OffsetDateTime,
    actor: &Actor,
) -> Record {
    let mut data = match omitted {
        OmittedFields::Retain => existing.data.clone(),
        OmittedFields::Drop => RecordData::new(),
    };

    for edit in update.edits() {
        let mut state = existing
            .field(edit.category_id, edit.field_id)
            .cloned()
            .unwrap_or_else(|| FieldState::new(edit.field_name));
        let outcome = apply_edit(&mut state, &edit, now, actor);
        debug!(
            record_id = %existing.id,
            category = edit.category_id,
            field = edit.field_id,
            ?outcome,
            "Merged field edit"
        );
        data.entry(edit.category_id.to_string())
            .or_default()
            .insert(edit.field_id.to_string(), state);
    }

    Record {
        id: existing.id,
        model_id: update.model_id,
        model_name: update.model_name.clone(),
        data,
        created_at: existing.created_at,
        updated_at: now,
        version: existing.version,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldline_core::ModelId;
    use time::macros::datetime;

    fn existing(model_id: ModelId) -> Record {
        let created = datetime!(2025-01-01 0:00 UTC);
        let update = RecordUpdate::new(model_id, "Employee")
            .set("personal", "f1", "firstName", "Ada")
            .set("personal", "f2", "lastName", "Lovelace")
            .set("contract", "f3", "salary", "100");
        Record::new(model_id, "Employee", initial_data(&update, created, &Actor::system()), created)
    }

    #[test]
    fn initial_values_carry_no_history() {
        let record = existing(ModelId::new());
        let first = record.field("personal", "f1").unwrap();
        assert_eq!(first.current_value, "Ada");
        assert!(first.history.is_empty());
    }

    #[test]
    fn dated_values_on_creation_are_queued() {
        let now = datetime!(2025-01-01 0:00 UTC);
        let update = RecordUpdate::new(ModelId::new(), "Employee").schedule(
            "contract",
            "f3",
            "salary",
            "200",
            datetime!(2025-07-01 0:00 UTC),
        );
        let data = initial_data(&update, now, &Actor::system());
        let salary = &data["contract"]["f3"];
        assert!(salary.current_value.is_empty());
        assert_eq!(salary.future_changes.len(), 1);
    }

    #[test]
    fn omitted_fields_are_dropped_by_default() {
        let model_id = ModelId::new();
        let record = existing(model_id);
        let now = datetime!(2025-02-01 0:00 UTC);
        let update =
            RecordUpdate::new(model_id, "Employee").set("personal", "f1", "firstName", "Grace");

        let next = merge_update(&record, &update, OmittedFields::Drop, now, &Actor::system());
        assert_eq!(next.fields().count(), 1);
        assert!(next.field("personal", "f2").is_none());
        assert!(!next.data.contains_key("contract"));
        assert_eq!(next.updated_at, now);
        assert_eq!(next.created_at, record.created_at);
        assert_eq!(next.version, record.version);
    }

    #[test]
    fn omitted_fields_survive_when_retained() {
        let model_id = ModelId::new();
        let record = existing(model_id);
        let update =
            RecordUpdate::new(model_id, "Employee").set("personal", "f1", "firstName", "Grace");

        let next = merge_update(
            &record,
            &update,
            OmittedFields::Retain,
            datetime!(2025-02-01 0:00 UTC),
            &Actor::system(),
        );
        assert_eq!(next.fields().count(), 3);
        assert_eq!(next.field("contract", "f3").unwrap().current_value, "100");
        assert_eq!(next.field("personal", "f1").unwrap().current_value, "Grace");
    }

    #[test]
    fn new_field_on_existing_record_archives_empty_value() {
        let model_id = ModelId::new();
        let record = existing(model_id);
        let update =
            RecordUpdate::new(model_id, "Employee").set("personal", "f9", "nickname", "Countess");

        let next = merge_update(
            &record,
            &update,
            OmittedFields::Drop,
            datetime!(2025-02-01 0:00 UTC),
            &Actor::system(),
        );
        let nickname = next.field("personal", "f9").unwrap();
        assert_eq!(nickname.current_value, "Countess");
        assert_eq!(nickname.history.len(), 1);
        assert_eq!(nickname.history[0].value, "");
    }

    #[test]
    fn renamed_field_refreshes_denormalized_name() {
        let model_id = ModelId::new();
        let record = existing(model_id);
        let update =
            RecordUpdate::new(model_id, "Employee").set("personal", "f1", "givenName", "Ada");

        let next = merge_update(
            &record,
            &update,
            OmittedFields::Drop,
            datetime!(2025-02-01 0:00 UTC),
            &Actor::system(),
        );
        let first = next.field("personal", "f1").unwrap();
        assert_eq!(first.name, "givenName");
        assert!(first.history.is_empty());
    }
}
