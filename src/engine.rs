//! Engine implementation
//!
//! [`Odb`] is bound to one database file and owns everything reachable from
//! it: the SQLite backend, the table and value stores, and the node arena.
//! All of it sits behind a single mutex. [`Odb::perform`] takes the lock and
//! hands out an [`OdbSession`], the only way to touch engine state.
//!
//! The lock is not reentrant. Calling back into the same `Odb` from inside
//! `perform` fails with [`Error::Reentrant`] rather than deadlocking.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread::ThreadId;
use crate::config::OdbConfig;
use crate::node::{Children, Node, NodeArena, NodeId, NodeKind, OdbObject, Table, ValueObject};
use crate::path::{OdbPath, fold_name};
use crate::storage::{OdbStats, SqliteBackend, TableStore, ValueStore};
use crate::value::OdbValue;
use crate::{Error, Result};

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

struct EngineState {
    backend: SqliteBackend,
    tables: TableStore,
    values: ValueStore,
    arena: NodeArena,
    closed: bool,
}

/// An object database bound to one file.
pub struct Odb {
    id: u64,
    file_path: PathBuf,
    state: Mutex<EngineState>,
    holder: Mutex<Option<ThreadId>>,
}

impl Odb {
    /// Open (or create) the database at `path` with default settings
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, &OdbConfig::default())
    }

    pub fn open_with_config(path: impl AsRef<Path>, config: &OdbConfig) -> Result<Self> {
        let path = path.as_ref();
        let backend = SqliteBackend::open(path, config)?;
        tracing::info!("Opened object database at {}", path.display());
        Ok(Self::with_backend(path.to_path_buf(), backend))
    }

    /// Open a database that lives only in memory (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let backend = SqliteBackend::open_in_memory(&OdbConfig::default())?;
        Ok(Self::with_backend(PathBuf::from(":memory:"), backend))
    }

    fn with_backend(file_path: PathBuf, backend: SqliteBackend) -> Self {
        Self {
            id: NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed),
            file_path,
            state: Mutex::new(EngineState {
                backend,
                tables: TableStore,
                values: ValueStore,
                arena: NodeArena::new(),
                closed: false,
            }),
            holder: Mutex::new(None),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Run `f` with exclusive access to the engine.
    ///
    /// Fails with `EngineClosed` after [`close`](Self::close) and with
    /// `Reentrant` when called from inside another `perform` on the same
    /// engine and thread.
    pub fn perform<T>(&self, f: impl FnOnce(&mut OdbSession<'_>) -> Result<T>) -> Result<T> {
        let engine = self.id;
        self.with_state(|state| {
            if state.closed {
                return Err(Error::EngineClosed);
            }
            f(&mut OdbSession { engine, state })
        })
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut EngineState) -> Result<T>) -> Result<T> {
        let current = std::thread::current().id();
        if *self.lock_holder() == Some(current) {
            tracing::warn!("Rejected nested engine access on {}", self.file_path.display());
            return Err(Error::Reentrant);
        }

        let mut guard = self.state.lock().unwrap_or_else(|poisoned| {
            // A panic inside perform may have left the cache out of step with the file
            tracing::warn!("Recovering poisoned engine lock, discarding cached nodes");
            let mut guard = poisoned.into_inner();
            guard.arena.reset();
            guard
        });
        self.state.clear_poison();

        *self.lock_holder() = Some(current);
        let _release = HolderRelease(&self.holder);
        f(&mut *guard)
    }

    fn lock_holder(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.holder.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Close the database. Every node handle obtained from this engine becomes
    /// invalid and every later call fails with `EngineClosed`. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        self.with_state(|state| {
            if state.closed {
                return Ok(());
            }
            let detached = state.arena.len();
            state.arena.clear();
            state.closed = true;
            state.backend.close()?;
            tracing::info!(detached, "Closed object database at {}", self.file_path.display());
            Ok(())
        })
    }

    pub fn is_closed(&self) -> Result<bool> {
        self.with_state(|state| Ok(state.closed))
    }

    /// Close the file but keep the engine and its cache. Calls that need the
    /// file fail with `Suspended` until [`resume`](Self::resume).
    pub fn suspend(&self) -> Result<()> {
        self.perform(|session| session.state.backend.suspend())
    }

    pub fn resume(&self) -> Result<()> {
        self.perform(|session| session.state.backend.resume())
    }

    /// Compact the database file
    pub fn compact(&self) -> Result<()> {
        self.perform(|session| session.compact())
    }

    pub fn stats(&self) -> Result<OdbStats> {
        self.perform(|session| session.stats())
    }

    pub fn root_table(&self) -> Result<Table> {
        self.perform(|session| session.root_table())
    }

    pub fn ensure_table(&self, path: &OdbPath) -> Result<Table> {
        self.perform(|session| session.ensure_table(path))
    }

    pub fn create_table(&self, path: &OdbPath) -> Result<Table> {
        self.perform(|session| session.create_table(path))
    }

    pub fn set_value(&self, path: &OdbPath, value: OdbValue) -> Result<ValueObject> {
        self.perform(|session| session.set_value(path, value))
    }

    pub fn delete_object(&self, path: &OdbPath) -> Result<()> {
        self.perform(|session| session.delete_object(path))
    }

    pub fn object(&self, path: &OdbPath) -> Result<OdbObject> {
        self.perform(|session| session.object(path))
    }

    pub fn table(&self, path: &OdbPath) -> Result<Table> {
        self.perform(|session| session.table(path))
    }

    pub fn value(&self, path: &OdbPath) -> Result<OdbValue> {
        self.perform(|session| session.value(path))
    }
}

struct HolderRelease<'a>(&'a Mutex<Option<ThreadId>>);

impl Drop for HolderRelease<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

/// Exclusive access to an open engine, valid for one [`Odb::perform`] call.
pub struct OdbSession<'a> {
    engine: u64,
    state: &'a mut EngineState,
}

impl OdbSession<'_> {
    // ========== Path Operations ==========

    pub fn root_table(&self) -> Result<Table> {
        match self.handle(self.state.arena.root())? {
            OdbObject::Table(table) => Ok(table),
            OdbObject::Value(_) => Err(Error::NotATable(OdbPath::root())),
        }
    }

    /// The node at `path`
    pub fn object(&mut self, path: &OdbPath) -> Result<OdbObject> {
        path.resolve(self)
    }

    /// The table at `path`; `NotATable` if a value is there
    pub fn table(&mut self, path: &OdbPath) -> Result<Table> {
        path.resolve_table(self)
    }

    /// The value leaf at `path`; `NotAValue` if a table is there
    pub fn value_object(&mut self, path: &OdbPath) -> Result<ValueObject> {
        path.resolve_value_object(self)
    }

    /// The value at `path`; `NotAValue` if a table is there
    pub fn value(&mut self, path: &OdbPath) -> Result<OdbValue> {
        path.resolve_value(self)
    }

    /// Make sure every table along `path` exists, creating missing ones.
    ///
    /// Never deletes anything: a value leaf along the way fails with `NotATable`.
    pub fn ensure_table(&mut self, path: &OdbPath) -> Result<Table> {
        let mut current = self.state.arena.root();
        for (depth, segment) in path.segments().iter().enumerate() {
            current = match self.child_node(current, segment)? {
                None => self.replace_child(current, segment, NodeKind::empty_table())?,
                Some(child) if self.node(child)?.is_table() => child,
                Some(_) => {
                    let walked = OdbPath::from_canonical(path.segments()[..=depth].to_vec());
                    return Err(Error::NotATable(walked));
                }
            };
        }
        self.table_handle(current)
    }

    /// Replace whatever is at `path` with a new, empty table.
    /// The parent table must already exist.
    pub fn create_table(&mut self, path: &OdbPath) -> Result<Table> {
        let parent = self.parent_table_for_write(path)?;
        self.add_subtable(&parent, path.name())
    }

    /// Replace whatever is at `path` with a value leaf.
    /// The parent table must already exist.
    pub fn set_value(&mut self, path: &OdbPath, value: OdbValue) -> Result<ValueObject> {
        let parent = self.parent_table_for_write(path)?;
        self.set_child_value(&parent, path.name(), value)
    }

    /// Delete the node at `path`, and everything under it if it is a table
    pub fn delete_object(&mut self, path: &OdbPath) -> Result<()> {
        let parent = self.parent_table_for_write(path)?;
        self.delete_child(&parent, path.name())
    }

    fn parent_table_for_write(&mut self, path: &OdbPath) -> Result<Table> {
        let parent_path = path
            .parent_table_path()
            .ok_or_else(|| Error::IllegalOperationOnRoot(path.clone()))?;
        parent_path.resolve_table(self)
    }

    // ========== Table Operations ==========

    /// All children of a table, ordered by lower-cased name
    pub fn children(&mut self, table: &Table) -> Result<Vec<OdbObject>> {
        let id = self.live_node(table.engine, table.node, table.name())?;
        self.load_children(id)?;
        let ids: Vec<NodeId> = self
            .state
            .arena
            .children(id)
            .map(|children| children.values().copied().collect())
            .unwrap_or_default();
        ids.into_iter().map(|child| self.handle(child)).collect()
    }

    /// The child of `table` named `name` (case-insensitive), if any
    pub fn child(&mut self, table: &Table, name: &str) -> Result<Option<OdbObject>> {
        let id = self.live_node(table.engine, table.node, table.name())?;
        self.child_node(id, name)?
            .map(|child| self.handle(child))
            .transpose()
    }

    /// Replace any child named `name` with a new, empty table
    pub fn add_subtable(&mut self, table: &Table, name: &str) -> Result<Table> {
        let id = self.live_node(table.engine, table.node, table.name())?;
        let child = self.replace_child(id, name, NodeKind::empty_table())?;
        self.table_handle(child)
    }

    /// Replace any child named `name` with a value leaf
    pub fn set_child_value(&mut self, table: &Table, name: &str, value: OdbValue) -> Result<ValueObject> {
        let id = self.live_node(table.engine, table.node, table.name())?;
        let child = self.replace_child(id, name, NodeKind::Value(value))?;
        match self.handle(child)? {
            OdbObject::Value(value_object) => Ok(value_object),
            OdbObject::Table(_) => Err(Error::NotAValue(self.path_of(child)?)),
        }
    }

    /// Delete the child named `name`; `Undefined` if there is none
    pub fn delete_child(&mut self, table: &Table, name: &str) -> Result<()> {
        let id = self.live_node(table.engine, table.node, table.name())?;
        if self.remove_child(id, name)? {
            Ok(())
        } else {
            let mut segments = self.path_of(id)?.segments().to_vec();
            segments.push(name.to_string());
            Err(Error::Undefined(OdbPath::from_canonical(segments)))
        }
    }

    /// Raw payload of the value child `name`, or `None` if there is no such child
    pub fn raw_value(&mut self, table: &Table, name: &str) -> Result<Option<serde_json::Value>> {
        match self.child(table, name)? {
            None => Ok(None),
            Some(OdbObject::Value(value_object)) => Ok(Some(value_object.value().to_raw())),
            Some(OdbObject::Table(child)) => Err(Error::NotAValue(self.table_path(&child)?)),
        }
    }

    /// Store a raw payload under `name`, inferring its primitive type.
    /// `None` deletes the child if present.
    pub fn set_raw_value(&mut self, table: &Table, name: &str, raw: Option<serde_json::Value>) -> Result<()> {
        match raw {
            Some(raw) => {
                let value = OdbValue::try_from(raw)?;
                self.set_child_value(table, name, value)?;
            }
            None => {
                let id = self.live_node(table.engine, table.node, table.name())?;
                self.remove_child(id, name)?;
            }
        }
        Ok(())
    }

    /// Path of a table
    pub fn table_path(&self, table: &Table) -> Result<OdbPath> {
        let id = self.live_node(table.engine, table.node, table.name())?;
        self.path_of(id)
    }

    pub fn value_path(&self, value_object: &ValueObject) -> Result<OdbPath> {
        let id = self.live_node(value_object.engine, value_object.node, value_object.name())?;
        self.path_of(id)
    }

    /// Path of any node
    pub fn object_path(&self, object: &OdbObject) -> Result<OdbPath> {
        let (engine, node) = object.handle_parts();
        let id = self.live_node(engine, node, object.name())?;
        self.path_of(id)
    }

    /// The table containing a node; `None` for the root table
    pub fn parent_table(&self, object: &OdbObject) -> Result<Option<Table>> {
        let (engine, node) = object.handle_parts();
        let id = self.live_node(engine, node, object.name())?;
        self.node(id)?
            .parent
            .map(|parent| self.table_handle(parent))
            .transpose()
    }

    // ========== Maintenance ==========

    pub fn stats(&self) -> Result<OdbStats> {
        let EngineState { backend, tables, values, .. } = &*self.state;
        backend.with_connection(|conn| {
            Ok(OdbStats {
                tables: tables.count(conn)?,
                values: values.count(conn)?,
            })
        })
    }

    pub fn compact(&self) -> Result<()> {
        self.state.backend.compact()?;
        tracing::info!("Compacted object database");
        Ok(())
    }

    // ========== Internals ==========

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.state
            .arena
            .get(id)
            .ok_or_else(|| Error::Detached(format!("{:?}", id)))
    }

    fn live_node(&self, engine: u64, node: NodeId, name: &str) -> Result<NodeId> {
        if engine != self.engine || self.state.arena.get(node).is_none() {
            return Err(Error::Detached(name.to_string()));
        }
        Ok(node)
    }

    fn handle(&self, id: NodeId) -> Result<OdbObject> {
        self.state
            .arena
            .handle(self.engine, id)
            .ok_or_else(|| Error::Detached(format!("{:?}", id)))
    }

    fn table_handle(&self, id: NodeId) -> Result<Table> {
        match self.handle(id)? {
            OdbObject::Table(table) => Ok(table),
            OdbObject::Value(_) => Err(Error::NotATable(self.path_of(id)?)),
        }
    }

    fn path_of(&self, id: NodeId) -> Result<OdbPath> {
        self.state
            .arena
            .path_of(id)
            .ok_or_else(|| Error::Detached(format!("{:?}", id)))
    }

    /// Fetch a table's children into its cache if not loaded yet.
    /// Values go in first, then tables, so a table wins a name collision.
    /// The shadowed row stays in the file; only the cache drops it.
    fn load_children(&mut self, table: NodeId) -> Result<()> {
        let node = self.node(table)?;
        if !node.is_table() {
            return Err(Error::NotATable(self.path_of(table)?));
        }
        if self.state.arena.children(table).is_some() {
            return Ok(());
        }
        let unique_id = node.unique_id;

        let EngineState { backend, tables, values, arena, .. } = &mut *self.state;
        let (table_rows, value_rows) = backend.with_connection(|conn| {
            Ok((tables.fetch_children(conn, unique_id)?, values.fetch_children(conn, unique_id)?))
        })?;
        tracing::debug!(
            table_id = unique_id,
            tables = table_rows.len(),
            values = value_rows.len(),
            "Loaded children"
        );

        let mut children = Children::new();
        let nodes = value_rows
            .into_iter()
            .map(|row| (row.id, row.name, NodeKind::Value(row.value)))
            .chain(
                table_rows
                    .into_iter()
                    .map(|row| (row.id, row.name, NodeKind::Table { children: None })),
            );
        for (row_id, name, kind) in nodes {
            let folded = fold_name(&name);
            let child = arena.insert(Node {
                unique_id: row_id,
                name,
                parent: Some(table),
                kind,
            });
            if let Some(shadowed) = children.insert(folded, child) {
                if let Some(node) = arena.get(shadowed) {
                    tracing::warn!(
                        table_id = unique_id,
                        row_id,
                        shadowed_id = node.unique_id,
                        shadowed_is_table = node.is_table(),
                        name = %node.name,
                        "Child row shadows another with the same name, leaving it in the file"
                    );
                }
                arena.remove_subtree(shadowed);
            }
        }
        arena.set_children(table, children);
        Ok(())
    }

    fn child_node(&mut self, table: NodeId, name: &str) -> Result<Option<NodeId>> {
        self.load_children(table)?;
        Ok(self.state.arena.child(table, &fold_name(name)))
    }

    /// Delete any child with the same lower-cased name, insert the new one,
    /// then update the cache. Both writes share one transaction.
    fn replace_child(&mut self, table: NodeId, name: &str, kind: NodeKind) -> Result<NodeId> {
        let existing = self.child_node(table, name)?;
        let parent_id = self.node(table)?.unique_id;
        let existing = match existing {
            Some(child) => {
                let node = self.node(child)?;
                Some((node.unique_id, node.is_table()))
            }
            None => None,
        };

        let EngineState { backend, tables, values, arena, .. } = &mut *self.state;
        let unique_id = backend.in_transaction(|conn| {
            match existing {
                Some((old_id, true)) => tables.delete(conn, old_id)?,
                Some((old_id, false)) => values.delete(conn, old_id)?,
                None => {}
            }
            match &kind {
                NodeKind::Table { .. } => tables.insert(conn, name, parent_id),
                NodeKind::Value(value) => values.insert(conn, name, parent_id, value),
            }
        })?;

        let folded = fold_name(name);
        arena.detach_child(table, &folded);
        let child = arena.insert(Node {
            unique_id,
            name: name.to_string(),
            parent: Some(table),
            kind,
        });
        arena.attach_child(table, folded, child);
        Ok(child)
    }

    /// Delete the child named `name`. Returns false if there is none.
    fn remove_child(&mut self, table: NodeId, name: &str) -> Result<bool> {
        let Some(child) = self.child_node(table, name)? else {
            return Ok(false);
        };
        let node = self.node(child)?;
        let (unique_id, is_table) = (node.unique_id, node.is_table());

        let EngineState { backend, tables, values, arena, .. } = &mut *self.state;
        backend.in_transaction(|conn| {
            if is_table {
                tables.delete(conn, unique_id)
            } else {
                values.delete(conn, unique_id)
            }
        })?;
        arena.detach_child(table, &fold_name(name));
        Ok(true)
    }
}
