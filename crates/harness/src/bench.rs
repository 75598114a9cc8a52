use std::sync::Arc;

use time::macros::datetime;
use time::{Duration, OffsetDateTime};

use fieldline_core::{
    Category, FieldDef, FieldState, FieldType, ManualClock, Model, ModelId, Record, RecordId,
    RecordUpdate, SelectOption,
};
use fieldline_engine::{Engine, EngineConfig, EngineError};
use fieldline_storage::{ModelCatalog, RecordStore, SqliteStorage, StorageError};

pub const PERSONAL: &str = "personal";
pub const CONTRACT: &str = "contract";
pub const FIRST_NAME: &str = "f_first";
pub const GRADE: &str = "f_grade";
pub const SALARY: &str = "f_salary";
pub const START_DATE: &str = "f_start";

/// Where every bench clock starts.
pub const BENCH_START: OffsetDateTime = datetime!(2025-01-15 09:30 UTC);

fn field(id: &str, name: &str, label: &str, field_type: FieldType) -> FieldDef {
    FieldDef {
        id: id.to_string(),
        name: name.to_string(),
        label: label.to_string(),
        field_type,
        required: false,
        options: Vec::new(),
    }
}

pub fn employee_model() -> Model {
    let mut grade = field(GRADE, "grade", "Grade", FieldType::Select);
    grade.options = vec![
        SelectOption {
            label: "Junior".into(),
            value: "J".into(),
        },
        SelectOption {
            label: "Senior".into(),
            value: "S".into(),
        },
    ];
    let mut first_name = field(FIRST_NAME, "firstName", "First name", FieldType::Text);
    first_name.required = true;

    Model {
        id: ModelId::new(),
        name: "Employee".into(),
        description: "HR master data".into(),
        categories: vec![
            Category {
                id: PERSONAL.into(),
                name: "Personal".into(),
                fields: vec![first_name, grade],
            },
            Category {
                id: CONTRACT.into(),
                name: "Contract".into(),
                fields: vec![
                    field(SALARY, "salary", "Salary", FieldType::Number),
                    field(START_DATE, "startDate", "Start date", FieldType::Date),
                ],
            },
        ],
    }
}

/// An engine over a fresh store, a manual clock, and a registered employee model.
pub struct TestBench<S = SqliteStorage> {
    pub engine: Arc<Engine<S>>,
    pub clock: ManualClock,
    pub model: Model,
}

impl TestBench<SqliteStorage> {
    pub fn new() -> Result<Self, StorageError> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Result<Self, StorageError> {
        Self::over(Arc::new(SqliteStorage::open_in_memory()?), config)
    }
}

impl<S: RecordStore + ModelCatalog> TestBench<S> {
    pub fn over(store: Arc<S>, config: EngineConfig) -> Result<Self, StorageError> {
        let model = employee_model();
        store.insert_model(&model)?;
        let clock = ManualClock::new(BENCH_START);
        let engine = Arc::new(Engine::new(store, Arc::new(clock.clone()), config));
        Ok(Self { engine, clock, model })
    }

    pub fn store(&self) -> &Arc<S> {
        self.engine.store()
    }

    pub fn field_name(&self, category_id: &str, field_id: &str) -> String {
        self.model
            .field(category_id, field_id)
            .map(|def| def.name.clone())
            .unwrap_or_else(|| field_id.to_string())
    }

    /// Empty edit batch for the bench model.
    pub fn update(&self) -> RecordUpdate {
        RecordUpdate::new(self.model.id, self.model.name.clone())
    }

    /// Edit batch resubmitting every stored field's current value, the way a
    /// form that shows all fields would.
    pub fn resubmit(&self, record: &Record) -> RecordUpdate {
        record
            .fields()
            .fold(self.update(), |update, (category_id, field_id, state)| {
                update.set(category_id, field_id, &state.name, &state.current_value)
            })
    }

    /// Create a record with `(category, field, value)` initial values.
    pub fn create(&self, values: &[(&str, &str, &str)]) -> Result<Record, EngineError> {
        let update = values
            .iter()
            .fold(self.update(), |update, (category_id, field_id, value)| {
                let name = self.field_name(category_id, field_id);
                update.set(category_id, field_id, &name, value)
            });
        self.engine.create_record(&update)
    }

    /// Change one field right away, resubmitting the others unchanged.
    pub fn set(
        &self,
        record_id: RecordId,
        category_id: &str,
        field_id: &str,
        value: &str,
    ) -> Result<Record, EngineError> {
        let record = self.engine.get_record(record_id)?;
        let name = self.field_name(category_id, field_id);
        let update = self.resubmit(&record).set(category_id, field_id, &name, value);
        self.engine.update_record(record_id, &update)
    }

    /// Queue a change to one field, resubmitting the others unchanged.
    pub fn schedule(
        &self,
        record_id: RecordId,
        category_id: &str,
        field_id: &str,
        value: &str,
        effective_date: OffsetDateTime,
    ) -> Result<Record, EngineError> {
        let record = self.engine.get_record(record_id)?;
        let name = self.field_name(category_id, field_id);
        let update = self
            .resubmit(&record)
            .schedule(category_id, field_id, &name, value, effective_date);
        self.engine.update_record(record_id, &update)
    }

    pub fn field(
        &self,
        record_id: RecordId,
        category_id: &str,
        field_id: &str,
    ) -> Result<Option<FieldState>, EngineError> {
        let record = self.engine.get_record(record_id)?;
        Ok(record.field(category_id, field_id).cloned())
    }

    pub fn advance_days(&self, days: i64) {
        self.clock.advance(Duration::days(days));
    }

    pub fn advance_to(&self, instant: OffsetDateTime) {
        self.clock.set(instant);
    }
}
