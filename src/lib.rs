//! # odb - Embedded hierarchical object store
//!
//! A tree of named tables whose leaves are typed scalar values, addressed by
//! paths and persisted in SQLite.
//!
//! odb provides:
//! - Canonical, case-insensitive paths (`OdbPath`)
//! - A closed set of value kinds with an optional application type (`OdbValue`)
//! - An engine (`Odb`) with filesystem-like operations: `ensure_table`,
//!   `create_table`, `set_value`, `delete_object`
//! - Lazily cached table children with cascading delete in the backing store
//!
//! All engine state sits behind one mutex per `Odb`. Use [`Odb::perform`] to
//! run several operations in one critical section:
//!
//! ```no_run
//! use odb::{Odb, OdbPath, OdbValue};
//!
//! let odb = Odb::open("settings.odb")?;
//! odb.perform(|session| {
//!     session.ensure_table(&OdbPath::new(["prefs", "window"]))?;
//!     session.set_value(&OdbPath::new(["prefs", "window", "width"]), OdbValue::integer(800))
//! })?;
//! # Ok::<(), odb::Error>(())
//! ```

pub mod config;
pub mod engine;
pub mod logging;
pub mod node;
pub mod path;
pub mod storage;
pub mod value;

// Re-exports for convenient access
pub use engine::{Odb, OdbSession};
pub use node::{OdbObject, Table, ValueObject};
pub use path::OdbPath;
pub use storage::OdbStats;
pub use value::{OdbValue, PrimitiveType};

/// Unique ID of the root table. The root is never stored as a row.
pub const ROOT_TABLE_ID: i64 = -1;

/// Reserved name of the root table; a leading path segment with this name is ignored.
pub const ROOT_TABLE_NAME: &str = "root";

/// Result type alias for odb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for odb operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Undefined: nothing exists at {0}")]
    Undefined(OdbPath),

    #[error("Not a table: {0}")]
    NotATable(OdbPath),

    #[error("Not a value: {0}")]
    NotAValue(OdbPath),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Engine is closed")]
    EngineClosed,

    #[error("Illegal operation on root table: {0}")]
    IllegalOperationOnRoot(OdbPath),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database is suspended")]
    Suspended,

    #[error("Engine lock is already held by this thread")]
    Reentrant,

    #[error("Node has been removed from its table: {0}")]
    Detached(String),
}
