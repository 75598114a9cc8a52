use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use fieldline_core::{
    Category, Model, ModelId, Record, RecordId,
    record::{data_from_msgpack, data_to_msgpack},
};

use crate::error::StorageError;
use crate::traits::{ModelCatalog, RecordStore};

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

fn format_ts(ts: OffsetDateTime) -> Result<String, StorageError> {
    ts.format(&Rfc3339)
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

fn parse_ts(s: &str, label: &str) -> Result<OffsetDateTime, StorageError> {
    OffsetDateTime::parse(s, &Rfc3339)
        .map_err(|e| StorageError::Serialization(format!("invalid {label}: {e}")))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// SQLite-backed store. The connection sits behind a mutex so one
/// `SqliteStorage` can be shared between request handlers and the
/// reconciler.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn schema_version(&self) -> Result<i32, StorageError> {
        crate::schema::schema_version(&self.conn.lock())
    }
}

type RecordRow = (Vec<u8>, Vec<u8>, String, Vec<u8>, String, String, i64);

const RECORD_COLUMNS: &str =
    "record_id, model_id, model_name, data, created_at, updated_at, version";

fn read_record_row(row: &rusqlite::Row) -> rusqlite::Result<RecordRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn decode_record(row: RecordRow) -> Result<Record, StorageError> {
    let (record_id, model_id, model_name, data, created_at, updated_at, version) = row;
    Ok(Record {
        id: RecordId::from_bytes(to_array::<16>(record_id, "record_id")?),
        model_id: ModelId::from_bytes(to_array::<16>(model_id, "model_id")?),
        model_name,
        data: data_from_msgpack(&data)?,
        created_at: parse_ts(&created_at, "created_at")?,
        updated_at: parse_ts(&updated_at, "updated_at")?,
        version: u64::try_from(version)
            .map_err(|_| StorageError::Serialization(format!("negative version {version}")))?,
    })
}

type ModelRow = (Vec<u8>, String, String, Vec<u8>);

fn decode_model(row: ModelRow) -> Result<Model, StorageError> {
    let (model_id, name, description, categories) = row;
    let categories: Vec<Category> = rmp_serde::from_slice(&categories)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(Model {
        id: ModelId::from_bytes(to_array::<16>(model_id, "model_id")?),
        name,
        description,
        categories,
    })
}

fn encode_categories(model: &Model) -> Result<Vec<u8>, StorageError> {
    rmp_serde::to_vec_named(&model.categories)
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

impl RecordStore for SqliteStorage {
    fn insert_record(&self, record: &Record) -> Result<(), StorageError> {
        let data = data_to_msgpack(&record.data)?;
        let version = i64::try_from(record.version)
            .map_err(|_| StorageError::Serialization("version overflow".into()))?;
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO records (record_id, model_id, model_name, data, created_at, updated_at, version) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                record.id.as_bytes().as_slice(),
                record.model_id.as_bytes().as_slice(),
                record.model_name,
                data,
                format_ts(record.created_at)?,
                format_ts(record.updated_at)?,
                version,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(StorageError::Collision(record.id.to_string()))
            }
            Err(e) => Err(StorageError::Sqlite(e)),
        }
    }

    fn load_record(&self, record_id: RecordId) -> Result<Option<Record>, StorageError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM records WHERE record_id = ?1"),
                rusqlite::params![record_id.as_bytes().as_slice()],
                read_record_row,
            )
            .optional()?;
        row.map(decode_record).transpose()
    }

    fn list_record_ids(&self) -> Result<Vec<RecordId>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT record_id FROM records ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;

        let mut result = Vec::new();
        for row in rows {
            result.push(RecordId::from_bytes(to_array::<16>(row?, "record_id")?));
        }
        Ok(result)
    }

    fn list_records(&self) -> Result<Vec<Record>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare(&format!("SELECT {RECORD_COLUMNS} FROM records ORDER BY rowid"))?;
        let rows = stmt.query_map([], read_record_row)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(decode_record(row?)?);
        }
        Ok(result)
    }

    fn replace_record(&self, record: &Record) -> Result<u64, StorageError> {
        let data = data_to_msgpack(&record.data)?;
        let expected = i64::try_from(record.version)
            .map_err(|_| StorageError::Serialization("version overflow".into()))?;
        let conn = self.conn.lock();

        // created_at is never rewritten.
        let changed = conn.execute(
            "UPDATE records SET model_id = ?1, model_name = ?2, data = ?3, updated_at = ?4, version = version + 1 WHERE record_id = ?5 AND version = ?6",
            rusqlite::params![
                record.model_id.as_bytes().as_slice(),
                record.model_name,
                data,
                format_ts(record.updated_at)?,
                record.id.as_bytes().as_slice(),
                expected,
            ],
        )?;
        if changed == 1 {
            return Ok(record.version + 1);
        }

        let actual: Option<i64> = conn
            .query_row(
                "SELECT version FROM records WHERE record_id = ?1",
                rusqlite::params![record.id.as_bytes().as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        match actual {
            None => Err(StorageError::NotFound(format!("record {}", record.id))),
            Some(actual) => Err(StorageError::VersionConflict {
                record_id: record.id.to_string(),
                expected: record.version,
                actual: actual.max(0) as u64,
            }),
        }
    }
}

impl ModelCatalog for SqliteStorage {
    fn insert_model(&self, model: &Model) -> Result<(), StorageError> {
        let categories = encode_categories(model)?;
        let now = format_ts(OffsetDateTime::now_utc())?;
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO models (model_id, name, description, categories, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            rusqlite::params![
                model.id.as_bytes().as_slice(),
                model.name,
                model.description,
                categories,
                now,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StorageError::Collision(model.id.to_string())),
            Err(e) => Err(StorageError::Sqlite(e)),
        }
    }

    fn update_model(&self, model: &Model) -> Result<(), StorageError> {
        let categories = encode_categories(model)?;
        let now = format_ts(OffsetDateTime::now_utc())?;
        let changed = self.conn.lock().execute(
            "UPDATE models SET name = ?1, description = ?2, categories = ?3, updated_at = ?4 WHERE model_id = ?5",
            rusqlite::params![
                model.name,
                model.description,
                categories,
                now,
                model.id.as_bytes().as_slice(),
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("model {}", model.id)));
        }
        Ok(())
    }

    fn load_model(&self, model_id: ModelId) -> Result<Option<Model>, StorageError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT model_id, name, description, categories FROM models WHERE model_id = ?1",
                rusqlite::params![model_id.as_bytes().as_slice()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        row.map(decode_model).transpose()
    }

    fn list_models(&self) -> Result<Vec<Model>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT model_id, name, description, categories FROM models ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(decode_model(row?)?);
        }
        Ok(result)
    }
}
