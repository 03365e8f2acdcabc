//! Value rows - persistence for value leaves
//!
//! The `value` column holds the payload in its natural SQLite storage class:
//! INTEGER for booleans and integers, REAL for doubles and dates, TEXT for
//! strings, BLOB for data. `primitive_type` says how to read it back.

use rusqlite::types::{ToSqlOutput, Type, ValueRef};
use rusqlite::{Connection, params};
use crate::value::{OdbValue, Payload, PrimitiveType};
use crate::{Error, Result};

/// A persisted value leaf (stored in `odb_values`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRow {
    pub id: i64,
    pub table_id: i64,
    pub name: String,
    pub value: OdbValue,
}

/// Maps value leaves to and from `odb_values` rows
#[derive(Debug, Default)]
pub struct ValueStore;

impl ValueStore {
    /// Insert a value row and return its backend-assigned ID
    pub fn insert(&self, conn: &Connection, name: &str, table_id: i64, value: &OdbValue) -> Result<i64> {
        conn.prepare_cached(
            r#"
            INSERT INTO odb_values (odb_table_id, name, primitive_type, application_type, value)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )?
        .execute(params![
            table_id,
            name,
            value.primitive_type().tag(),
            value.application_type(),
            payload_to_sql(value.payload()),
        ])?;
        let id = conn.last_insert_rowid();
        tracing::debug!(id, table_id, name, primitive_type = %value.primitive_type(), "Inserted value row");
        Ok(id)
    }

    /// Get the value leaves of a table
    pub fn fetch_children(&self, conn: &Connection, table_id: i64) -> Result<Vec<ValueRow>> {
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT id, odb_table_id, name, primitive_type, application_type, value
            FROM odb_values WHERE odb_table_id = ?1 ORDER BY id
            "#,
        )?;

        let rows = stmt
            .query_map([table_id], |row| self.row_to_value(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    /// Delete a value row
    pub fn delete(&self, conn: &Connection, id: i64) -> Result<()> {
        conn.prepare_cached("DELETE FROM odb_values WHERE id = ?1")?
            .execute([id])?;
        tracing::debug!(id, "Deleted value row");
        Ok(())
    }

    /// Count all value rows
    pub fn count(&self, conn: &Connection) -> Result<usize> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM odb_values", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Helper to convert a row to a ValueRow
    fn row_to_value(&self, row: &rusqlite::Row) -> rusqlite::Result<ValueRow> {
        let tag: i64 = row.get(3)?;
        let primitive_type = PrimitiveType::from_tag(tag).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                Type::Integer,
                Box::new(Error::InvalidPayload(format!("Unknown primitive type tag: {}", tag))),
            )
        })?;

        // SQLite stores NaN as NULL
        let payload = match primitive_type {
            PrimitiveType::Boolean => Payload::Boolean(row.get::<_, i64>(5)? != 0),
            PrimitiveType::Integer => Payload::Integer(row.get(5)?),
            PrimitiveType::Double => Payload::Double(row.get::<_, Option<f64>>(5)?.unwrap_or(f64::NAN)),
            PrimitiveType::Date => Payload::Date(row.get::<_, Option<f64>>(5)?.unwrap_or(f64::NAN)),
            PrimitiveType::String => Payload::String(row.get::<_, Option<String>>(5)?.unwrap_or_default()),
            PrimitiveType::Data => Payload::Data(row.get::<_, Option<Vec<u8>>>(5)?.unwrap_or_default()),
        };

        Ok(ValueRow {
            id: row.get(0)?,
            table_id: row.get(1)?,
            name: row.get(2)?,
            value: OdbValue::new(payload, row.get(4)?),
        })
    }
}

fn payload_to_sql(payload: &Payload) -> ToSqlOutput<'_> {
    match payload {
        Payload::Boolean(b) => ToSqlOutput::from(*b),
        Payload::Integer(i) => ToSqlOutput::from(*i),
        Payload::Double(d) | Payload::Date(d) => ToSqlOutput::from(*d),
        Payload::String(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        Payload::Data(bytes) => ToSqlOutput::Borrowed(ValueRef::Blob(bytes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OdbConfig;
    use crate::storage::{SqliteBackend, TableStore};
    use crate::ROOT_TABLE_ID;
    use std::time::{Duration, UNIX_EPOCH};

    fn sample_values() -> Vec<OdbValue> {
        vec![
            OdbValue::boolean(true),
            OdbValue::integer(-42),
            OdbValue::double(3.25),
            OdbValue::date(UNIX_EPOCH + Duration::from_secs(1_600_000_000)),
            OdbValue::string("hello").with_application_type("greeting"),
            OdbValue::data(vec![0xde, 0xad, 0xbe, 0xef]),
            OdbValue::data(Vec::new()),
        ]
    }

    #[test]
    fn test_values_decode_by_primitive_type() {
        let backend = SqliteBackend::open_in_memory(&OdbConfig::default()).unwrap();
        let store = ValueStore;

        backend
            .with_connection(|conn| {
                for (i, value) in sample_values().iter().enumerate() {
                    store.insert(conn, &format!("v{}", i), ROOT_TABLE_ID, value)?;
                }

                let rows = store.fetch_children(conn, ROOT_TABLE_ID)?;
                let fetched: Vec<OdbValue> = rows.into_iter().map(|r| r.value).collect();
                assert_eq!(fetched, sample_values());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_nan_survives_null_storage() {
        let backend = SqliteBackend::open_in_memory(&OdbConfig::default()).unwrap();
        let store = ValueStore;

        backend
            .with_connection(|conn| {
                store.insert(conn, "nan", ROOT_TABLE_ID, &OdbValue::double(f64::NAN))?;
                let rows = store.fetch_children(conn, ROOT_TABLE_ID)?;
                assert!(rows[0].value.as_f64().unwrap().is_nan());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_unknown_tag_is_storage_error() {
        let backend = SqliteBackend::open_in_memory(&OdbConfig::default()).unwrap();

        let result = backend.with_connection(|conn| {
            conn.execute(
                "INSERT INTO odb_values (odb_table_id, name, primitive_type, value) VALUES (-1, 'bad', 99, 1)",
                [],
            )?;
            ValueStore.fetch_children(conn, ROOT_TABLE_ID)
        });
        assert!(matches!(result, Err(Error::Storage(_))));
    }

    #[test]
    fn test_table_delete_removes_values() {
        let backend = SqliteBackend::open_in_memory(&OdbConfig::default()).unwrap();
        let tables = TableStore;
        let values = ValueStore;

        backend
            .with_connection(|conn| {
                let a = tables.insert(conn, "a", ROOT_TABLE_ID)?;
                let b = tables.insert(conn, "b", a)?;
                values.insert(conn, "x", a, &OdbValue::integer(1))?;
                values.insert(conn, "y", b, &OdbValue::integer(2))?;
                values.insert(conn, "z", ROOT_TABLE_ID, &OdbValue::integer(3))?;

                tables.delete(conn, a)?;
                assert_eq!(values.count(conn)?, 1);
                assert!(values.fetch_children(conn, b)?.is_empty());
                Ok(())
            })
            .unwrap();
    }
}
