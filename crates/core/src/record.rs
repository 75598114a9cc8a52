use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::field_state::FieldState;
use crate::ids::{ModelId, RecordId};
use crate::CoreError;

/// category id -> field id -> state
pub type RecordData = BTreeMap<String, BTreeMap<String, FieldState>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    pub model_id: ModelId,
    pub model_name: String,
    #[serde(default)]
    pub data: RecordData,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Bumped by the store on every successful replace.
    #[serde(default)]
    pub version: u64,
}

impl Record {
    pub fn new(
        model_id: ModelId,
        model_name: impl Into<String>,
        data: RecordData,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: RecordId::new(),
            model_id,
            model_name: model_name.into(),
            data,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    pub fn field(&self, category_id: &str, field_id: &str) -> Option<&FieldState> {
        self.data.get(category_id)?.get(field_id)
    }

    pub fn field_mut(&mut self, category_id: &str, field_id: &str) -> Option<&mut FieldState> {
        self.data.get_mut(category_id)?.get_mut(field_id)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str, &FieldState)> {
        self.data.iter().flat_map(|(category_id, fields)| {
            fields
                .iter()
                .map(move |(field_id, state)| (category_id.as_str(), field_id.as_str(), state))
        })
    }

    pub fn fields_mut(&mut self) -> impl Iterator<Item = (&str, &str, &mut FieldState)> {
        self.data.iter_mut().flat_map(|(category_id, fields)| {
            fields
                .iter_mut()
                .map(move |(field_id, state)| (category_id.as_str(), field_id.as_str(), state))
        })
    }

    pub fn has_due(&self, now: OffsetDateTime) -> bool {
        self.fields().any(|(_, _, state)| state.has_due(now))
    }
}

pub fn data_to_msgpack(data: &RecordData) -> Result<Vec<u8>, CoreError> {
    rmp_serde::to_vec_named(data).map_err(|e| CoreError::Serialization(e.to_string()))
}

pub fn data_from_msgpack(bytes: &[u8]) -> Result<RecordData, CoreError> {
    rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
}

/// One submitted value for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldUpdate {
    pub name: String,
    #[serde(default)]
    pub value: String,
    /// `None` applies the value now; otherwise it is queued for that date.
    #[serde(default, with = "crate::clock::effective_date")]
    pub effective_date: Option<OffsetDateTime>,
}

/// An edit batch as submitted for a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUpdate {
    pub model_id: ModelId,
    pub model_name: String,
    #[serde(default)]
    pub data: BTreeMap<String, BTreeMap<String, FieldUpdate>>,
}

/// A single flattened edit out of a [`RecordUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldEdit<'a> {
    pub category_id: &'a str,
    pub field_id: &'a str,
    pub field_name: &'a str,
    pub new_value: &'a str,
    pub effective_date: Option<OffsetDateTime>,
}

impl RecordUpdate {
    pub fn new(model_id: ModelId, model_name: impl Into<String>) -> Self {
        Self {
            model_id,
            model_name: model_name.into(),
            data: BTreeMap::new(),
        }
    }

    /// Add an edit that applies immediately.
    pub fn set(self, category_id: &str, field_id: &str, name: &str, value: &str) -> Self {
        self.with(category_id, field_id, name, value, None)
    }

    /// Add an edit that takes effect on the given date.
    pub fn schedule(
        self,
        category_id: &str,
        field_id: &str,
        name: &str,
        value: &str,
        effective_date: OffsetDateTime,
    ) -> Self {
        self.with(category_id, field_id, name, value, Some(effective_date))
    }

    fn with(
        mut self,
        category_id: &str,
        field_id: &str,
        name: &str,
        value: &str,
        effective_date: Option<OffsetDateTime>,
    ) -> Self {
        self.data.entry(category_id.to_string()).or_default().insert(
            field_id.to_string(),
            FieldUpdate {
                name: name.to_string(),
                value: value.to_string(),
                effective_date,
            },
        );
        self
    }

    pub fn edits(&self) -> impl Iterator<Item = FieldEdit<'_>> {
        self.data.iter().flat_map(|(category_id, fields)| {
            fields.iter().map(move |(field_id, update)| FieldEdit {
                category_id,
                field_id,
                field_name: &update.name,
                new_value: &update.value,
                effective_date: update.effective_date,
            })
        })
    }

    pub fn is_empty(&self) -> bool {
        self.data.values().all(BTreeMap::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Actor;
    use time::macros::datetime;

    #[test]
    fn edit_request_json_shape_deserializes() {
        let update: RecordUpdate = serde_json::from_str(
            r#"{
                "modelId": "0190a1b2-0000-7000-8000-000000000001",
                "modelName": "Employee",
                "data": {
                    "personal": {
                        "f1": {"name": "firstName", "value": "Ada"},
                        "f2": {"name": "grade", "value": "S", "effectiveDate": "2099-01-01"},
                        "f4": {"name": "nickname", "value": "x", "effectiveDate": null},
                        "f5": {"name": "team", "value": "core", "effectiveDate": ""}
                    }
                }
            }"#,
        )
        .unwrap();

        let edits: Vec<_> = update.edits().collect();
        assert_eq!(edits.len(), 4);
        assert_eq!(edits[0].field_id, "f1");
        assert_eq!(edits[0].effective_date, None);
        assert_eq!(edits[1].effective_date, Some(datetime!(2099-01-01 0:00 UTC)));
        assert_eq!(edits[2].effective_date, None);
        assert_eq!(edits[3].effective_date, None);
    }

    #[test]
    fn bad_effective_date_fails_deserialization() {
        let result: Result<FieldUpdate, _> =
            serde_json::from_str(r#"{"name": "grade", "value": "S", "effectiveDate": "someday"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn record_data_survives_msgpack() {
        let now = datetime!(2025-05-05 10:00 UTC);
        let mut record = Record::new(ModelId::new(), "Employee", RecordData::new(), now);
        let state = record
            .data
            .entry("personal".into())
            .or_default()
            .entry("f1".into())
            .or_insert_with(|| FieldState::new("firstName"));
        state.apply_immediate("Ada", now, &Actor::system());
        state.schedule("Grace", datetime!(2026-01-01 0:00 UTC), now, &Actor::system());

        let bytes = data_to_msgpack(&record.data).unwrap();
        assert_eq!(data_from_msgpack(&bytes).unwrap(), record.data);
    }

    #[test]
    fn record_exposes_fields_and_due_state() {
        let now = datetime!(2025-05-05 10:00 UTC);
        let mut record = Record::new(ModelId::new(), "Employee", RecordData::new(), now);
        record
            .data
            .entry("contract".into())
            .or_default()
            .insert("f3".into(), FieldState::new("salary"));
        assert!(!record.has_due(now));

        record
            .field_mut("contract", "f3")
            .unwrap()
            .schedule("100", datetime!(2025-05-01 0:00 UTC), now, &Actor::system());
        assert!(record.has_due(now));
        assert_eq!(record.fields().count(), 1);
    }
}
