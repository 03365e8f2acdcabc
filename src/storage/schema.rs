//! Database schema definitions

/// SQL to create the tables table. Children of the root table have `parent_id = -1`.
pub const CREATE_TABLES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS odb_tables (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id INTEGER NOT NULL,
    name TEXT NOT NULL
)
"#;

/// SQL to create the values table
pub const CREATE_VALUES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS odb_values (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    odb_table_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    primitive_type INTEGER NOT NULL,
    application_type TEXT,
    value BLOB
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS odb_tables_parent_id_index ON odb_tables(parent_id)",
    "CREATE INDEX IF NOT EXISTS odb_values_odb_table_id_index ON odb_values(odb_table_id)",
];

/// Cascade triggers. Deleting a table row deletes its sub-tables (recursively,
/// with `recursive_triggers` on) and its values.
pub const CREATE_TRIGGERS: &[&str] = &[
    r#"
    CREATE TRIGGER IF NOT EXISTS odb_tables_delete_subtables
    AFTER DELETE ON odb_tables
    BEGIN
        DELETE FROM odb_tables WHERE parent_id = old.id;
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS odb_tables_delete_values
    AFTER DELETE ON odb_tables
    BEGIN
        DELETE FROM odb_values WHERE odb_table_id = old.id;
    END
    "#,
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![CREATE_TABLES_TABLE, CREATE_VALUES_TABLE];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts.extend(CREATE_TRIGGERS.iter().copied());
    stmts
}
