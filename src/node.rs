//! Node graph - tables and value leaves cached in memory
//!
//! The engine owns every node in a [`NodeArena`]. Nodes refer to their parent
//! by [`NodeId`], and callers hold [`Table`] / [`ValueObject`] handles that
//! carry a `NodeId`, never a reference. A `NodeId` has a generation; when a
//! node is removed (child deleted, engine closed) its slot's generation moves
//! on and every outstanding handle to it stops resolving.

use std::collections::BTreeMap;
use crate::path::OdbPath;
use crate::value::OdbValue;
use crate::{ROOT_TABLE_ID, ROOT_TABLE_NAME};

/// Generational index of a node in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId {
    index: u32,
    generation: u32,
}

/// Children cache of a table, keyed by lower-cased name
pub(crate) type Children = BTreeMap<String, NodeId>;

#[derive(Debug)]
pub(crate) enum NodeKind {
    /// `children` is `None` until first fetched
    Table { children: Option<Children> },
    Value(OdbValue),
}

impl NodeKind {
    /// A table known to be empty, so its cache needs no fetch
    pub fn empty_table() -> Self {
        NodeKind::Table {
            children: Some(Children::new()),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Node {
    pub unique_id: i64,
    pub name: String,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
}

impl Node {
    pub fn is_table(&self) -> bool {
        matches!(self.kind, NodeKind::Table { .. })
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Owner of all cached nodes of one engine
#[derive(Debug)]
pub(crate) struct NodeArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
}

impl NodeArena {
    /// Create an arena holding only the root table
    pub fn new() -> Self {
        let mut arena = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId { index: 0, generation: 0 },
        };
        arena.root = arena.insert(Self::root_node());
        arena
    }

    fn root_node() -> Node {
        Node {
            unique_id: ROOT_TABLE_ID,
            name: ROOT_TABLE_NAME.to_string(),
            parent: None,
            kind: NodeKind::Table { children: None },
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn insert(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId { index, generation: 0 }
    }

    /// Loaded children of a table. `None` if not a table or not yet fetched.
    pub fn children(&self, table: NodeId) -> Option<&Children> {
        match &self.get(table)?.kind {
            NodeKind::Table { children } => children.as_ref(),
            NodeKind::Value(_) => None,
        }
    }

    /// Install a freshly fetched children cache
    pub fn set_children(&mut self, table: NodeId, loaded: Children) {
        if let Some(Node {
            kind: NodeKind::Table { children },
            ..
        }) = self.get_mut(table)
        {
            *children = Some(loaded);
        }
    }

    /// Look up a loaded child by lower-cased name
    pub fn child(&self, table: NodeId, folded_name: &str) -> Option<NodeId> {
        self.children(table)?.get(folded_name).copied()
    }

    /// Record a new child in the parent's cache, if the cache is loaded
    pub fn attach_child(&mut self, table: NodeId, folded_name: String, child: NodeId) {
        if let Some(Node {
            kind: NodeKind::Table {
                children: Some(children),
            },
            ..
        }) = self.get_mut(table)
        {
            children.insert(folded_name, child);
        }
    }

    /// Remove a child from the parent's cache and free it with its cached subtree
    pub fn detach_child(&mut self, table: NodeId, folded_name: &str) {
        let removed = match self.get_mut(table) {
            Some(Node {
                kind: NodeKind::Table {
                    children: Some(children),
                },
                ..
            }) => children.remove(folded_name),
            _ => None,
        };
        if let Some(child) = removed {
            self.remove_subtree(child);
        }
    }

    /// Free a node and every cached descendant
    pub fn remove_subtree(&mut self, id: NodeId) {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let Some(node) = self.free_slot(id) else {
                continue;
            };
            if let NodeKind::Table {
                children: Some(children),
            } = node.kind
            {
                pending.extend(children.into_values());
            }
        }
    }

    fn free_slot(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(node)
    }

    /// Detach every node, root included. Outstanding ids stop resolving.
    pub fn clear(&mut self) {
        self.free.clear();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
            self.free.push(index as u32);
        }
    }

    /// Drop every cached node and start again from an unloaded root
    pub fn reset(&mut self) {
        self.clear();
        self.root = self.insert(Self::root_node());
    }

    /// Number of live nodes, root included
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.node.is_some()).count()
    }

    /// Path of a node, built by walking parent links
    pub fn path_of(&self, id: NodeId) -> Option<OdbPath> {
        let mut segments = Vec::new();
        let mut current = self.get(id)?;
        while let Some(parent) = current.parent {
            segments.push(current.name.clone());
            current = self.get(parent)?;
        }
        segments.reverse();
        Some(OdbPath::from_canonical(segments))
    }

    /// Build the caller-facing handle for a live node
    pub fn handle(&self, engine: u64, id: NodeId) -> Option<OdbObject> {
        let node = self.get(id)?;
        let object = match &node.kind {
            NodeKind::Table { .. } => OdbObject::Table(Table {
                engine,
                node: id,
                unique_id: node.unique_id,
                name: node.name.clone(),
            }),
            NodeKind::Value(value) => {
                let table_id = node
                    .parent
                    .and_then(|parent| self.get(parent))
                    .map(|parent| parent.unique_id)?;
                OdbObject::Value(ValueObject {
                    engine,
                    node: id,
                    unique_id: node.unique_id,
                    table_id,
                    name: node.name.clone(),
                    value: value.clone(),
                })
            }
        };
        Some(object)
    }
}

/// Handle to a table node.
///
/// Two handles are equal when they refer to the same live node of the same
/// engine. Operations on a table go through an [`OdbSession`](crate::OdbSession).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Table {
    pub(crate) engine: u64,
    pub(crate) node: NodeId,
    unique_id: i64,
    name: String,
}

impl Table {
    /// Backend-assigned ID; `-1` for the root table
    pub fn unique_id(&self) -> i64 {
        self.unique_id
    }

    /// Name as stored, original case preserved
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_root(&self) -> bool {
        self.unique_id == ROOT_TABLE_ID
    }
}

/// Handle to a persisted value leaf. Carries a copy of the (immutable) value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValueObject {
    pub(crate) engine: u64,
    pub(crate) node: NodeId,
    unique_id: i64,
    table_id: i64,
    name: String,
    value: OdbValue,
}

impl ValueObject {
    pub fn unique_id(&self) -> i64 {
        self.unique_id
    }

    /// Unique ID of the containing table
    pub fn table_id(&self) -> i64 {
        self.table_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &OdbValue {
        &self.value
    }
}

/// A node: either a table or a value leaf
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OdbObject {
    Table(Table),
    Value(ValueObject),
}

impl OdbObject {
    pub fn name(&self) -> &str {
        match self {
            OdbObject::Table(table) => table.name(),
            OdbObject::Value(value_object) => value_object.name(),
        }
    }

    pub fn unique_id(&self) -> i64 {
        match self {
            OdbObject::Table(table) => table.unique_id(),
            OdbObject::Value(value_object) => value_object.unique_id(),
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self, OdbObject::Table(_))
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            OdbObject::Table(table) => Some(table),
            OdbObject::Value(_) => None,
        }
    }

    pub fn as_value_object(&self) -> Option<&ValueObject> {
        match self {
            OdbObject::Value(value_object) => Some(value_object),
            OdbObject::Table(_) => None,
        }
    }

    pub(crate) fn handle_parts(&self) -> (u64, NodeId) {
        match self {
            OdbObject::Table(table) => (table.engine, table.node),
            OdbObject::Value(value_object) => (value_object.engine, value_object.node),
        }
    }
}
