//! ODB paths - canonical addresses for tables and values
//!
//! A path is an ordered list of name segments such as `["prefs", "window", "width"]`.
//! A leading `root` segment is optional and dropped; `[]` and `["root"]` both
//! address the root table. Segments keep their case for storage and display
//! but compare case-insensitively.

use crate::engine::OdbSession;
use crate::node::{OdbObject, Table, ValueObject};
use crate::value::OdbValue;
use crate::{Error, Result, ROOT_TABLE_NAME};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

/// Case folding used for every name comparison in the store.
pub(crate) fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

/// Immutable, canonical path to a node.
///
/// Paths are plain values: they do not belong to any engine and can be kept,
/// hashed, and shared freely. Cloning is cheap.
#[derive(Clone)]
pub struct OdbPath {
    segments: Arc<[String]>,
    folded: Arc<[String]>,
}

impl OdbPath {
    /// Create a path from segments, dropping a leading `root` segment.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments
            .first()
            .is_some_and(|first| fold_name(first) == ROOT_TABLE_NAME)
        {
            segments.remove(0);
        }
        Self::from_canonical(segments)
    }

    /// Build a path from segments that are already canonical. A first segment
    /// named `root` here is a real table named "root", not the root marker.
    pub(crate) fn from_canonical(segments: Vec<String>) -> Self {
        let folded: Vec<String> = segments.iter().map(|s| fold_name(s)).collect();
        Self {
            segments: segments.into(),
            folded: folded.into(),
        }
    }

    /// The path of the root table
    pub fn root() -> Self {
        Self::new(Vec::<String>::new())
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Canonical segments, original case preserved
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment, or `root` for the root path
    pub fn name(&self) -> &str {
        self.segments
            .last()
            .map(String::as_str)
            .unwrap_or(ROOT_TABLE_NAME)
    }

    /// Path of the table containing this node. `None` for the root path.
    pub fn parent_table_path(&self) -> Option<OdbPath> {
        let (_, parent) = self.segments.split_last()?;
        Some(Self::from_canonical(parent.to_vec()))
    }

    /// Path of a child named `segment` inside this path.
    pub fn path_by_adding(&self, segment: impl Into<String>) -> OdbPath {
        if self.is_root() {
            return Self::new([segment.into()]);
        }
        let mut segments = self.segments.to_vec();
        segments.push(segment.into());
        Self::from_canonical(segments)
    }

    /// Resolve this path to the node it addresses.
    ///
    /// The parent path must resolve to a table: a value there yields
    /// `NotATable(parent)`, nothing there yields `Undefined(parent)`.
    pub fn resolve(&self, session: &mut OdbSession<'_>) -> Result<OdbObject> {
        let Some(parent_path) = self.parent_table_path() else {
            return Ok(OdbObject::Table(session.root_table()?));
        };
        let parent = parent_path.resolve_table(session)?;
        session
            .child(&parent, self.name())?
            .ok_or_else(|| Error::Undefined(self.clone()))
    }

    /// Resolve to a table, failing with `NotATable` on a value leaf.
    pub fn resolve_table(&self, session: &mut OdbSession<'_>) -> Result<Table> {
        match self.resolve(session)? {
            OdbObject::Table(table) => Ok(table),
            OdbObject::Value(_) => Err(Error::NotATable(self.clone())),
        }
    }

    /// Resolve to a value leaf, failing with `NotAValue` on a table.
    pub fn resolve_value_object(&self, session: &mut OdbSession<'_>) -> Result<ValueObject> {
        match self.resolve(session)? {
            OdbObject::Value(value_object) => Ok(value_object),
            OdbObject::Table(_) => Err(Error::NotAValue(self.clone())),
        }
    }

    /// Resolve to the value stored at this path.
    pub fn resolve_value(&self, session: &mut OdbSession<'_>) -> Result<OdbValue> {
        Ok(self.resolve_value_object(session)?.value().clone())
    }
}

impl PartialEq for OdbPath {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded
    }
}

impl Eq for OdbPath {}

impl Hash for OdbPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded.hash(state);
    }
}

impl fmt::Display for OdbPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", ROOT_TABLE_NAME)?;
        for segment in self.segments.iter() {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl fmt::Debug for OdbPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OdbPath({})", self)
    }
}

impl FromStr for OdbPath {
    type Err = Error;

    /// Parse a `/`-separated path. Empty segments are skipped, so
    /// `"/a//b/"` and `"root/a/b"` both yield `["a", "b"]`.
    fn from_str(s: &str) -> Result<Self> {
        Ok(Self::new(s.split('/').filter(|segment| !segment.is_empty())))
    }
}

impl<S: Into<String>> FromIterator<S> for OdbPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

// Serialized with an explicit leading `root` so a first table literally named
// "root" survives the round trip.
impl Serialize for OdbPath {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeSeq;
        let mut seq = serializer.serialize_seq(Some(self.segments.len() + 1))?;
        seq.serialize_element(ROOT_TABLE_NAME)?;
        for segment in self.segments.iter() {
            seq.serialize_element(segment)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for OdbPath {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let segments = Vec::<String>::deserialize(deserializer)?;
        Ok(OdbPath::new(segments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_leading_root_is_dropped() {
        let path = OdbPath::new(["Root", "prefs", "window"]);
        assert_eq!(path.segments(), &["prefs".to_string(), "window".to_string()]);
        assert_eq!(path, OdbPath::new(["prefs", "window"]));

        assert!(OdbPath::new(["root"]).is_root());
        assert!(OdbPath::new(Vec::<String>::new()).is_root());
        assert_eq!(OdbPath::root().name(), "root");
    }

    #[test]
    fn test_only_leading_root_is_special() {
        let path = OdbPath::new(["prefs", "root"]);
        assert_eq!(path.segments().len(), 2);
        assert_eq!(path.name(), "root");
    }

    #[test]
    fn test_case_insensitive_equality_and_hash() {
        let upper = OdbPath::new(["A", "B"]);
        let lower = OdbPath::new(["a", "b"]);
        assert_eq!(upper, lower);

        let mut set = HashSet::new();
        set.insert(upper.clone());
        assert!(set.contains(&lower));

        // Display keeps the original case
        assert_eq!(upper.to_string(), "root/A/B");
    }

    #[test]
    fn test_parent_and_adding() {
        let path = OdbPath::new(["a", "b", "c"]);
        assert_eq!(path.parent_table_path(), Some(OdbPath::new(["a", "b"])));
        assert_eq!(OdbPath::new(["a"]).parent_table_path(), Some(OdbPath::root()));
        assert_eq!(OdbPath::root().parent_table_path(), None);

        let added = OdbPath::new(["a", "b"]).path_by_adding("C");
        assert_eq!(added, path);
        assert_eq!(added.name(), "C");

        // Adding "root" to the root path is the root path itself
        assert!(OdbPath::root().path_by_adding("ROOT").is_root());
        // Deeper, "root" is an ordinary name
        assert_eq!(OdbPath::new(["a"]).path_by_adding("root").segments().len(), 2);
    }

    #[test]
    fn test_from_str() {
        let path: OdbPath = "root/Prefs//Window/".parse().unwrap();
        assert_eq!(path, OdbPath::new(["prefs", "window"]));
        assert!("".parse::<OdbPath>().unwrap().is_root());
    }

    #[test]
    fn test_serde_as_segments() {
        let path = OdbPath::new(["prefs", "Window"]);
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, r#"["root","prefs","Window"]"#);

        let parsed: OdbPath = serde_json::from_str(r#"["PREFS","window"]"#).unwrap();
        assert_eq!(parsed, path);

        // A table literally named "root" keeps its place
        let literal = OdbPath::new(["root", "root"]);
        assert!(!literal.is_root());
        let back: OdbPath = serde_json::from_str(&serde_json::to_string(&literal).unwrap()).unwrap();
        assert_eq!(back, literal);
        assert_eq!(back.segments().len(), 1);
    }
}
