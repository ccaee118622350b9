//! SQLite-backed record store.
//!
//! Each record is one row in `instances` plus one row per field in
//! `instance_fields`. Field values keep their SQLite affinity; the `kind`
//! column disambiguates booleans from integers and marks nulls.

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::migrations;
use super::record::{FieldValue, Record};
use super::store::StateStore;
use crate::error::StoreError;
use crate::feature::FeatureType;

/// SQLite database holding every instance record.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at `path` and bring its schema up to date.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::migrate(&conn).map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".into()))
    }

    fn read_fields(
        conn: &Connection,
        feature: FeatureType,
        instance_id: u32,
    ) -> Result<Vec<(String, FieldValue)>, rusqlite::Error> {
        let mut stmt = conn.prepare_cached(
            "SELECT key, kind, value FROM instance_fields
             WHERE feature = ?1 AND instance_id = ?2
             ORDER BY key",
        )?;
        let rows = stmt.query_map(params![feature.key(), instance_id], |row| {
            let key: String = row.get(0)?;
            let kind: String = row.get(1)?;
            let value: Value = row.get(2)?;
            Ok((key, decode_field(&kind, value)))
        })?;
        let fields = rows.collect();
        fields
    }
}

fn encode_field(value: &FieldValue) -> Value {
    match value {
        FieldValue::Int(v) => Value::Integer(*v),
        FieldValue::Real(v) => Value::Real(*v),
        FieldValue::Bool(v) => Value::Integer(i64::from(*v)),
        FieldValue::Text(v) => Value::Text(v.clone()),
        FieldValue::Null => Value::Null,
    }
}

fn decode_field(kind: &str, value: Value) -> FieldValue {
    match (kind, value) {
        (_, Value::Null) => FieldValue::Null,
        ("bool", Value::Integer(v)) => FieldValue::Bool(v != 0),
        (_, Value::Integer(v)) => FieldValue::Int(v),
        (_, Value::Real(v)) => FieldValue::Real(v),
        (_, Value::Text(v)) => FieldValue::Text(v),
        (_, Value::Blob(_)) => FieldValue::Null,
    }
}

/// Write `record` into the instance tables. The caller owns the transaction.
pub(super) fn write_record(conn: &Connection, record: &Record) -> Result<(), rusqlite::Error> {
    let feature = record.feature.key();
    conn.execute(
        "INSERT INTO instances (feature, instance_id, schema_version, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(feature, instance_id)
         DO UPDATE SET schema_version = excluded.schema_version, updated_at = excluded.updated_at",
        params![
            feature,
            record.instance_id,
            record.schema_version,
            Utc::now().to_rfc3339()
        ],
    )?;
    conn.execute(
        "DELETE FROM instance_fields WHERE feature = ?1 AND instance_id = ?2",
        params![feature, record.instance_id],
    )?;
    let mut insert = conn.prepare_cached(
        "INSERT INTO instance_fields (feature, instance_id, key, kind, value)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (key, value) in &record.fields {
        insert.execute(params![
            feature,
            record.instance_id,
            key,
            value.kind(),
            encode_field(value)
        ])?;
    }
    Ok(())
}

impl StateStore for Database {
    fn get(&self, feature: FeatureType, instance_id: u32) -> Result<Option<Record>, StoreError> {
        let conn = self.conn()?;
        let version: Option<u32> = conn
            .query_row(
                "SELECT schema_version FROM instances WHERE feature = ?1 AND instance_id = ?2",
                params![feature.key(), instance_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(schema_version) = version else {
            return Ok(None);
        };

        let mut record = Record::new(feature, instance_id, schema_version);
        record.fields = Self::read_fields(&conn, feature, instance_id)?
            .into_iter()
            .collect();
        Ok(Some(record))
    }

    fn upsert(&self, record: &Record) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        write_record(&tx, record)?;
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, feature: FeatureType, instance_id: u32) -> Result<(), StoreError> {
        // Field rows go with the parent through ON DELETE CASCADE.
        self.conn()?.execute(
            "DELETE FROM instances WHERE feature = ?1 AND instance_id = ?2",
            params![feature.key(), instance_id],
        )?;
        Ok(())
    }

    fn list_active(&self, feature: FeatureType) -> Result<Vec<Record>, StoreError> {
        let conn = self.conn()?;
        let heads: Vec<(u32, u32)> = {
            let mut stmt = conn.prepare_cached(
                "SELECT instance_id, schema_version FROM instances
                 WHERE feature = ?1 ORDER BY instance_id",
            )?;
            let rows = stmt.query_map(params![feature.key()], |row| Ok((row.get(0)?, row.get(1)?)))?;
            let heads = rows.collect::<Result<Vec<_>, _>>()?;
            heads
        };

        heads
            .into_iter()
            .map(|(instance_id, schema_version)| -> Result<Record, StoreError> {
                let mut record = Record::new(feature, instance_id, schema_version);
                record.fields = Self::read_fields(&conn, feature, instance_id)?
                    .into_iter()
                    .collect();
                Ok(record)
            })
            .collect()
    }
}
