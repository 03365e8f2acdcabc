//! SQLite backend - connection lifecycle, transactions, and maintenance

use std::path::{Path, PathBuf};
use std::time::Duration;
use rusqlite::Connection;
use crate::config::OdbConfig;
use crate::{Error, Result};
use super::schema;

enum BackendState {
    Open(Connection),
    Suspended,
    Closed,
}

/// SQLite connection owner.
///
/// Every call runs synchronously on the caller's thread. Callers are expected
/// to hold the engine lock; the backend does no locking of its own.
pub struct SqliteBackend {
    /// `None` for an in-memory database
    path: Option<PathBuf>,
    config: OdbConfig,
    state: BackendState,
}

impl SqliteBackend {
    /// Open a database file (creates if doesn't exist) and ensure the schema
    pub fn open(path: &Path, config: &OdbConfig) -> Result<Self> {
        crate::config::ensure_db_dir(path)?;
        Self::open_at(Some(path.to_path_buf()), config)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory(config: &OdbConfig) -> Result<Self> {
        Self::open_at(None, config)
    }

    fn open_at(path: Option<PathBuf>, config: &OdbConfig) -> Result<Self> {
        let conn = connect(path.as_deref(), config)?;
        let backend = Self {
            path,
            config: config.clone(),
            state: BackendState::Open(conn),
        };
        backend.create_schema(&schema::all_schema_statements())?;
        Ok(backend)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self.state, BackendState::Suspended)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, BackendState::Closed)
    }

    /// Run schema statements (CREATE ... IF NOT EXISTS)
    pub fn create_schema(&self, statements: &[&str]) -> Result<()> {
        self.with_connection(|conn| {
            for stmt in statements {
                conn.execute_batch(stmt)?;
            }
            Ok(())
        })
    }

    /// Run a block against the connection
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        match &self.state {
            BackendState::Open(conn) => f(conn),
            BackendState::Suspended => Err(Error::Suspended),
            BackendState::Closed => Err(Error::EngineClosed),
        }
    }

    /// Run a block inside one transaction. Commits on `Ok`, rolls back on `Err`.
    pub fn in_transaction<T>(&mut self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        match &mut self.state {
            BackendState::Open(conn) => {
                let tx = conn.transaction()?;
                let result = f(&tx)?;
                tx.commit()?;
                Ok(result)
            }
            BackendState::Suspended => Err(Error::Suspended),
            BackendState::Closed => Err(Error::EngineClosed),
        }
    }

    /// Compact the database file
    pub fn compact(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute_batch("VACUUM")?;
            Ok(())
        })
    }

    /// Close the connection but allow `resume` to reopen it.
    /// In-memory databases would lose their contents, so they stay open.
    pub fn suspend(&mut self) -> Result<()> {
        if self.path.is_none() {
            tracing::debug!("Ignoring suspend for in-memory database");
            return Ok(());
        }
        match std::mem::replace(&mut self.state, BackendState::Suspended) {
            BackendState::Open(conn) => {
                conn.close().map_err(|(_, e)| Error::Storage(e))?;
                tracing::debug!("Suspended database {:?}", self.path);
                Ok(())
            }
            BackendState::Suspended => Ok(()),
            BackendState::Closed => {
                self.state = BackendState::Closed;
                Err(Error::EngineClosed)
            }
        }
    }

    /// Reopen a suspended connection
    pub fn resume(&mut self) -> Result<()> {
        match self.state {
            BackendState::Suspended => {
                let conn = connect(self.path.as_deref(), &self.config)?;
                self.state = BackendState::Open(conn);
                tracing::debug!("Resumed database {:?}", self.path);
                Ok(())
            }
            BackendState::Open(_) => Ok(()),
            BackendState::Closed => Err(Error::EngineClosed),
        }
    }

    /// Close the connection for good
    pub fn close(&mut self) -> Result<()> {
        if let BackendState::Open(conn) = std::mem::replace(&mut self.state, BackendState::Closed) {
            conn.close().map_err(|(_, e)| Error::Storage(e))?;
        }
        Ok(())
    }
}

fn connect(path: Option<&Path>, config: &OdbConfig) -> Result<Connection> {
    let conn = match path {
        Some(path) => Connection::open(path)?,
        None => Connection::open_in_memory()?,
    };
    conn.pragma_update(None, "synchronous", config.synchronous.as_str())?;
    // Cascading deletes go through a trigger on odb_tables that deletes from odb_tables
    conn.pragma_update(None, "recursive_triggers", true)?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    conn.set_prepared_statement_cache_capacity(config.cache_statements);
    Ok(conn)
}

/// Database statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OdbStats {
    pub tables: usize,
    pub values: usize,
}

impl std::fmt::Display for OdbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Tables: {}", self.tables)?;
        writeln!(f, "  Values: {}", self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_tables(backend: &SqliteBackend) -> Result<i64> {
        backend.with_connection(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM odb_tables", [], |row| row.get(0))?)
        })
    }

    fn insert_table(conn: &Connection, name: &str) -> Result<()> {
        conn.execute("INSERT INTO odb_tables (parent_id, name) VALUES (-1, ?1)", [name])?;
        Ok(())
    }

    #[test]
    fn test_schema_is_idempotent() {
        let backend = SqliteBackend::open_in_memory(&OdbConfig::default()).unwrap();
        backend.create_schema(&schema::all_schema_statements()).unwrap();
        assert_eq!(count_tables(&backend).unwrap(), 0);
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let mut backend = SqliteBackend::open_in_memory(&OdbConfig::default()).unwrap();

        let result: Result<()> = backend.in_transaction(|conn| {
            insert_table(conn, "doomed")?;
            Err(Error::InvalidPayload("abort".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(count_tables(&backend).unwrap(), 0);
    }

    #[test]
    fn test_suspend_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suspend.odb");
        let mut backend = SqliteBackend::open(&path, &OdbConfig::default()).unwrap();
        backend.with_connection(|conn| insert_table(conn, "kept")).unwrap();

        backend.suspend().unwrap();
        assert!(backend.is_suspended());
        assert!(matches!(count_tables(&backend), Err(Error::Suspended)));

        backend.resume().unwrap();
        assert_eq!(count_tables(&backend).unwrap(), 1);
    }

    #[test]
    fn test_closed_backend_rejects_calls() {
        let mut backend = SqliteBackend::open_in_memory(&OdbConfig::default()).unwrap();
        backend.close().unwrap();
        assert!(backend.is_closed());
        assert!(matches!(backend.compact(), Err(Error::EngineClosed)));
        assert!(matches!(backend.resume(), Err(Error::EngineClosed)));
        // Closing twice is harmless
        backend.close().unwrap();
    }

    #[test]
    fn test_stats_display() {
        let stats = OdbStats { tables: 2, values: 5 };
        let text = stats.to_string();
        assert!(text.contains("Tables: 2"));
        assert!(text.contains("Values: 5"));
    }
}
