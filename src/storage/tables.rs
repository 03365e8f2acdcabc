//! Table rows - persistence for table nodes

use rusqlite::{Connection, params};
use crate::Result;

/// A persisted table (stored in `odb_tables`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub id: i64,
    pub parent_id: i64,
    pub name: String,
}

/// Maps table nodes to and from `odb_tables` rows
#[derive(Debug, Default)]
pub struct TableStore;

impl TableStore {
    /// Insert a table row and return its backend-assigned ID
    pub fn insert(&self, conn: &Connection, name: &str, parent_id: i64) -> Result<i64> {
        conn.prepare_cached("INSERT INTO odb_tables (parent_id, name) VALUES (?1, ?2)")?
            .execute(params![parent_id, name])?;
        let id = conn.last_insert_rowid();
        tracing::debug!(id, parent_id, name, "Inserted table row");
        Ok(id)
    }

    /// Get the immediate sub-tables of a table
    pub fn fetch_children(&self, conn: &Connection, parent_id: i64) -> Result<Vec<TableRow>> {
        let mut stmt = conn.prepare_cached(
            "SELECT id, parent_id, name FROM odb_tables WHERE parent_id = ?1 ORDER BY id",
        )?;

        let rows = stmt
            .query_map([parent_id], |row| self.row_to_table(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    /// Delete a table row with all its descendants and their values.
    ///
    /// Rows go deepest first, so the cascade triggers find nothing left to
    /// delete and never recurse.
    pub fn delete(&self, conn: &Connection, id: i64) -> Result<()> {
        let subtree = self.subtree_ids(conn, id)?;

        let mut delete_values = conn.prepare_cached("DELETE FROM odb_values WHERE odb_table_id = ?1")?;
        let mut delete_table = conn.prepare_cached("DELETE FROM odb_tables WHERE id = ?1")?;
        for table_id in &subtree {
            delete_values.execute([table_id])?;
            delete_table.execute([table_id])?;
        }

        tracing::debug!(id, tables = subtree.len(), "Deleted table subtree");
        Ok(())
    }

    /// IDs of a table and every table below it, deepest first
    fn subtree_ids(&self, conn: &Connection, id: i64) -> Result<Vec<i64>> {
        let mut stmt = conn.prepare_cached(
            "WITH RECURSIVE sub(id, depth) AS (
                SELECT ?1, 0
                UNION ALL
                SELECT t.id, sub.depth + 1 FROM odb_tables t JOIN sub ON t.parent_id = sub.id
            )
            SELECT id FROM sub ORDER BY depth DESC, id DESC",
        )?;

        let ids = stmt
            .query_map([id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;

        Ok(ids)
    }

    /// Count all table rows
    pub fn count(&self, conn: &Connection) -> Result<usize> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM odb_tables", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Helper to convert a row to a TableRow
    fn row_to_table(&self, row: &rusqlite::Row) -> rusqlite::Result<TableRow> {
        Ok(TableRow {
            id: row.get(0)?,
            parent_id: row.get(1)?,
            name: row.get(2)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OdbConfig;
    use crate::storage::SqliteBackend;
    use crate::ROOT_TABLE_ID;

    #[test]
    fn test_table_crud() {
        let backend = SqliteBackend::open_in_memory(&OdbConfig::default()).unwrap();
        let store = TableStore;

        backend
            .with_connection(|conn| {
                let prefs = store.insert(conn, "Prefs", ROOT_TABLE_ID)?;
                let window = store.insert(conn, "window", prefs)?;

                let top = store.fetch_children(conn, ROOT_TABLE_ID)?;
                assert_eq!(top, vec![TableRow { id: prefs, parent_id: ROOT_TABLE_ID, name: "Prefs".into() }]);

                let nested = store.fetch_children(conn, prefs)?;
                assert_eq!(nested.len(), 1);
                assert_eq!(nested[0].id, window);

                store.delete(conn, window)?;
                assert!(store.fetch_children(conn, prefs)?.is_empty());
                assert_eq!(store.count(conn)?, 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_delete_cascades_to_descendants() {
        let backend = SqliteBackend::open_in_memory(&OdbConfig::default()).unwrap();
        let store = TableStore;

        backend
            .with_connection(|conn| {
                let a = store.insert(conn, "a", ROOT_TABLE_ID)?;
                let b = store.insert(conn, "b", a)?;
                let c = store.insert(conn, "c", b)?;
                store.insert(conn, "d", c)?;
                store.insert(conn, "other", ROOT_TABLE_ID)?;

                store.delete(conn, a)?;
                assert_eq!(store.count(conn)?, 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_delete_deeper_than_trigger_limit() {
        let backend = SqliteBackend::open_in_memory(&OdbConfig::default()).unwrap();
        let store = TableStore;

        backend
            .with_connection(|conn| {
                let top = store.insert(conn, "t0", ROOT_TABLE_ID)?;
                let mut parent = top;
                for depth in 1..1100 {
                    parent = store.insert(conn, &format!("t{}", depth), parent)?;
                }
                conn.execute(
                    "INSERT INTO odb_values (odb_table_id, name, primitive_type, value) VALUES (?1, 'leaf', 1, 7)",
                    [parent],
                )?;
                assert_eq!(store.count(conn)?, 1100);

                store.delete(conn, top)?;
                assert_eq!(store.count(conn)?, 0);
                let values: i64 = conn.query_row("SELECT COUNT(*) FROM odb_values", [], |row| row.get(0))?;
                assert_eq!(values, 0);
                Ok(())
            })
            .unwrap();
    }
}
