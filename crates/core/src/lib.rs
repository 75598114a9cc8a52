pub mod clock;
pub mod error;
pub mod field_state;
pub mod ids;
pub mod record;
pub mod schema;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CoreError;
pub use field_state::{FieldState, FutureChange, HistoryEntry, Promotion};
pub use ids::*;
pub use record::{FieldEdit, FieldUpdate, Record, RecordData, RecordUpdate};
pub use schema::{Category, FieldDef, FieldType, Model, SelectOption};
