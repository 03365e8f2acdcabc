//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - odb_tables(id, parent_id, name)
//! - odb_values(id, odb_table_id, name, primitive_type, application_type, value)
//!
//! Deleting a row from odb_tables cascades to its sub-tables and values via triggers.

pub mod schema;
pub mod sqlite;
pub mod tables;
pub mod values;

pub use sqlite::{OdbStats, SqliteBackend};
pub use tables::{TableRow, TableStore};
pub use values::{ValueRow, ValueStore};
