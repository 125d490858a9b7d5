//! Path-addressable value tree used to parameterize chart rendering
//!
//! A [`ValueTree`] is a nested map of [`Node`]s addressed by dotted paths
//! (`global.multiCluster.enabled`). Storage is a `BTreeMap`, so structural
//! equality never depends on insertion order.
//!
//! Typed accessors never coerce: asking for a string where a map lives fails
//! with a [`MergeTypeError`]. An explicit `null` leaf reads as absent.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Type mismatch encountered while walking or reading a value tree
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("type mismatch at '{path}': expected {expected}, found {found}")]
pub struct MergeTypeError {
    /// Dotted path where the mismatch was found
    pub path: String,
    /// Kind the caller asked for
    pub expected: &'static str,
    /// Kind actually stored at the path
    pub found: &'static str,
}

impl MergeTypeError {
    /// Create a mismatch error for `path`
    pub fn new(path: impl Into<String>, expected: &'static str, found: &'static str) -> Self {
        Self {
            path: path.into(),
            expected,
            found,
        }
    }
}

/// Leaf value
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    /// Explicit null
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// String
    String(String),
}

/// One node of a value tree
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// Nested map
    Map(BTreeMap<String, Node>),
    /// Ordered list
    List(Vec<Node>),
    /// Leaf
    Scalar(Scalar),
}

impl Node {
    /// Short name of this node's kind, used in type errors
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Map(_) => "map",
            Node::List(_) => "list",
            Node::Scalar(Scalar::Null) => "null",
            Node::Scalar(Scalar::Bool(_)) => "bool",
            Node::Scalar(Scalar::Int(_)) => "int",
            Node::Scalar(Scalar::Float(_)) => "float",
            Node::Scalar(Scalar::String(_)) => "string",
        }
    }

    /// True for an explicit null leaf
    pub fn is_null(&self) -> bool {
        matches!(self, Node::Scalar(Scalar::Null))
    }

    /// Borrow as a string leaf
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Read as a bool leaf
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Scalar(Scalar::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Read as an integer leaf
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Node::Scalar(Scalar::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// Borrow as a nested map
    pub fn as_map(&self) -> Option<&BTreeMap<String, Node>> {
        match self {
            Node::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Borrow as a list
    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(l) => Some(l),
            _ => None,
        }
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::Scalar(Scalar::Bool(b))
    }
}

impl From<i64> for Node {
    fn from(i: i64) -> Self {
        Node::Scalar(Scalar::Int(i))
    }
}

impl From<i32> for Node {
    fn from(i: i32) -> Self {
        Node::Scalar(Scalar::Int(i64::from(i)))
    }
}

impl From<f64> for Node {
    fn from(f: f64) -> Self {
        Node::Scalar(Scalar::Float(f))
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::Scalar(Scalar::String(s.to_string()))
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::Scalar(Scalar::String(s))
    }
}

impl<T: Into<Node>> From<Vec<T>> for Node {
    fn from(items: Vec<T>) -> Self {
        Node::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Node>> for Node {
    fn from(map: BTreeMap<String, Node>) -> Self {
        Node::Map(map)
    }
}

impl From<ValueTree> for Node {
    fn from(tree: ValueTree) -> Self {
        Node::Map(tree.root)
    }
}

impl From<serde_json::Value> for Node {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Node::Scalar(Scalar::Null),
            Value::Bool(b) => Node::Scalar(Scalar::Bool(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Node::Scalar(Scalar::Int(i)),
                None => Node::Scalar(Scalar::Float(n.as_f64().unwrap_or_default())),
            },
            Value::String(s) => Node::Scalar(Scalar::String(s)),
            Value::Array(items) => Node::List(items.into_iter().map(Node::from).collect()),
            Value::Object(map) => {
                Node::Map(map.into_iter().map(|(k, v)| (k, Node::from(v))).collect())
            }
        }
    }
}

impl From<Node> for serde_json::Value {
    fn from(node: Node) -> Self {
        use serde_json::Value;
        match node {
            Node::Scalar(Scalar::Null) => Value::Null,
            Node::Scalar(Scalar::Bool(b)) => Value::Bool(b),
            Node::Scalar(Scalar::Int(i)) => Value::Number(i.into()),
            Node::Scalar(Scalar::Float(f)) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Node::Scalar(Scalar::String(s)) => Value::String(s),
            Node::List(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Node::Map(map) => Value::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
        }
    }
}

/// Root of a value tree: always a map
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub struct ValueTree {
    root: BTreeMap<String, Node>,
}

impl ValueTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing map
    pub fn from_map(root: BTreeMap<String, Node>) -> Self {
        Self { root }
    }

    /// True when the tree has no top-level keys
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Borrow the top-level map
    pub fn as_map(&self) -> &BTreeMap<String, Node> {
        &self.root
    }

    /// Consume into the top-level map
    pub fn into_map(self) -> BTreeMap<String, Node> {
        self.root
    }

    /// Convert to a JSON value (always an object)
    pub fn to_json(&self) -> serde_json::Value {
        self.clone().into()
    }

    /// Look up the node at `path`
    ///
    /// Returns `Ok(None)` when any segment is missing, and a
    /// [`MergeTypeError`] when an intermediate segment is not a map.
    pub fn get(&self, path: &str) -> Result<Option<&Node>, MergeTypeError> {
        let segments: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            return Ok(None);
        };

        let mut current = &self.root;
        for (i, segment) in parents.iter().enumerate() {
            match current.get(*segment) {
                None => return Ok(None),
                Some(Node::Map(child)) => current = child,
                Some(other) => {
                    return Err(MergeTypeError::new(
                        segments[..=i].join("."),
                        "map",
                        other.kind(),
                    ))
                }
            }
        }
        Ok(current.get(*last))
    }

    /// Read a string leaf
    pub fn get_string(&self, path: &str) -> Result<Option<String>, MergeTypeError> {
        self.read(path, "string", |n| n.as_str().map(str::to_string))
    }

    /// Read a bool leaf
    pub fn get_bool(&self, path: &str) -> Result<Option<bool>, MergeTypeError> {
        self.read(path, "bool", Node::as_bool)
    }

    /// Read an integer leaf
    pub fn get_i64(&self, path: &str) -> Result<Option<i64>, MergeTypeError> {
        self.read(path, "int", Node::as_i64)
    }

    /// Read a list
    pub fn get_list(&self, path: &str) -> Result<Option<Vec<Node>>, MergeTypeError> {
        self.read(path, "list", |n| n.as_list().map(<[Node]>::to_vec))
    }

    /// Read a nested map
    pub fn get_map(&self, path: &str) -> Result<Option<BTreeMap<String, Node>>, MergeTypeError> {
        self.read(path, "map", |n| n.as_map().cloned())
    }

    /// Read a list whose items must all be strings
    pub fn get_string_list(&self, path: &str) -> Result<Option<Vec<String>>, MergeTypeError> {
        match self.get_list(path)? {
            None => Ok(None),
            Some(items) => strings_from(path, items).map(Some),
        }
    }

    fn read<T>(
        &self,
        path: &str,
        expected: &'static str,
        extract: impl Fn(&Node) -> Option<T>,
    ) -> Result<Option<T>, MergeTypeError> {
        match self.get(path)? {
            None => Ok(None),
            Some(node) if node.is_null() => Ok(None),
            Some(node) => extract(node)
                .map(Some)
                .ok_or_else(|| MergeTypeError::new(path, expected, node.kind())),
        }
    }

    /// Set `path` to `value`, creating intermediate maps as needed
    pub fn set(&mut self, path: &str, value: impl Into<Node>) -> Result<(), MergeTypeError> {
        let segments: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            return Ok(());
        };

        let mut current = &mut self.root;
        for (i, segment) in parents.iter().enumerate() {
            let entry = current
                .entry((*segment).to_string())
                .or_insert_with(|| Node::Map(BTreeMap::new()));
            current = match entry {
                Node::Map(child) => child,
                other => {
                    return Err(MergeTypeError::new(
                        segments[..=i].join("."),
                        "map",
                        other.kind(),
                    ))
                }
            };
        }
        current.insert((*last).to_string(), value.into());
        Ok(())
    }

    /// Remove and return the node at `path`
    ///
    /// A second call for the same path returns `Ok(None)`. Parent maps left
    /// empty by the removal are pruned.
    pub fn get_and_remove(&mut self, path: &str) -> Result<Option<Node>, MergeTypeError> {
        let segments: Vec<&str> = path.split('.').collect();
        remove_at(&mut self.root, &segments, 0)
    }

    /// Remove and return a string leaf
    pub fn get_and_remove_string(&mut self, path: &str) -> Result<Option<String>, MergeTypeError> {
        self.take(path, "string", |n| match n {
            Node::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        })
    }

    /// Remove and return a bool leaf
    pub fn get_and_remove_bool(&mut self, path: &str) -> Result<Option<bool>, MergeTypeError> {
        self.take(path, "bool", |n| n.as_bool())
    }

    /// Remove and return an integer leaf
    pub fn get_and_remove_i64(&mut self, path: &str) -> Result<Option<i64>, MergeTypeError> {
        self.take(path, "int", |n| n.as_i64())
    }

    /// Remove and return a list
    pub fn get_and_remove_list(&mut self, path: &str) -> Result<Option<Vec<Node>>, MergeTypeError> {
        self.take(path, "list", |n| match n {
            Node::List(items) => Some(items),
            _ => None,
        })
    }

    /// Remove and return a nested map
    pub fn get_and_remove_map(
        &mut self,
        path: &str,
    ) -> Result<Option<BTreeMap<String, Node>>, MergeTypeError> {
        self.take(path, "map", |n| match n {
            Node::Map(map) => Some(map),
            _ => None,
        })
    }

    /// Remove and return a list of strings
    pub fn get_and_remove_string_list(
        &mut self,
        path: &str,
    ) -> Result<Option<Vec<String>>, MergeTypeError> {
        if let Some(Node::List(items)) = self.get(path)? {
            strings_from(path, items.clone())?;
        }
        match self.get_and_remove_list(path)? {
            None => Ok(None),
            Some(items) => strings_from(path, items).map(Some),
        }
    }

    /// Type-check before removing so a mismatch leaves the tree untouched
    fn take<T>(
        &mut self,
        path: &str,
        expected: &'static str,
        extract: impl Fn(Node) -> Option<T>,
    ) -> Result<Option<T>, MergeTypeError> {
        if let Some(node) = self.get(path)? {
            if !node.is_null() && extract(node.clone()).is_none() {
                return Err(MergeTypeError::new(path, expected, node.kind()));
            }
        }
        match self.get_and_remove(path)? {
            None => Ok(None),
            Some(node) if node.is_null() => Ok(None),
            Some(node) => Ok(extract(node)),
        }
    }

    /// Merge `secondary` into `primary`, returning a new tree
    ///
    /// Maps merge recursively. When both trees hold a non-map value for the
    /// same key, the primary value is kept. Keys only present in `secondary`
    /// are added unchanged.
    pub fn merge(primary: &ValueTree, secondary: &ValueTree) -> ValueTree {
        let mut merged = primary.clone();
        merged.merge_from(secondary);
        merged
    }

    /// Merge `secondary` under `self`; `self` wins every collision
    pub fn merge_from(&mut self, secondary: &ValueTree) {
        merge_maps(&mut self.root, &secondary.root);
    }
}

fn strings_from(path: &str, items: Vec<Node>) -> Result<Vec<String>, MergeTypeError> {
    items
        .into_iter()
        .map(|item| match item {
            Node::Scalar(Scalar::String(s)) => Ok(s),
            other => Err(MergeTypeError::new(path, "string", other.kind())),
        })
        .collect()
}

fn remove_at(
    map: &mut BTreeMap<String, Node>,
    segments: &[&str],
    depth: usize,
) -> Result<Option<Node>, MergeTypeError> {
    let Some((segment, rest)) = segments[depth..].split_first() else {
        return Ok(None);
    };
    if rest.is_empty() {
        return Ok(map.remove(*segment));
    }

    let (removed, now_empty) = match map.get_mut(*segment) {
        None => return Ok(None),
        Some(Node::Map(child)) => {
            let removed = remove_at(child, segments, depth + 1)?;
            (removed, child.is_empty())
        }
        Some(other) => {
            return Err(MergeTypeError::new(
                segments[..=depth].join("."),
                "map",
                other.kind(),
            ))
        }
    };

    if removed.is_some() && now_empty {
        map.remove(*segment);
    }
    Ok(removed)
}

fn merge_maps(primary: &mut BTreeMap<String, Node>, secondary: &BTreeMap<String, Node>) {
    for (key, theirs) in secondary {
        match primary.entry(key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(theirs.clone());
            }
            Entry::Occupied(mut slot) => {
                if let (Node::Map(ours), Node::Map(theirs)) = (slot.get_mut(), theirs) {
                    merge_maps(ours, theirs);
                }
            }
        }
    }
}

impl TryFrom<serde_json::Value> for ValueTree {
    type Error = MergeTypeError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match Node::from(value) {
            Node::Map(root) => Ok(Self { root }),
            Node::Scalar(Scalar::Null) => Ok(Self::default()),
            other => Err(MergeTypeError::new("", "map", other.kind())),
        }
    }
}

impl From<ValueTree> for serde_json::Value {
    fn from(tree: ValueTree) -> Self {
        Node::Map(tree.root).into()
    }
}

impl JsonSchema for ValueTree {
    fn schema_name() -> String {
        "ValueTree".to_string()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(_gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        use schemars::schema::{InstanceType, Schema, SchemaObject};

        let mut schema = SchemaObject {
            instance_type: Some(InstanceType::Object.into()),
            ..Default::default()
        };
        schema.extensions.insert(
            "x-kubernetes-preserve-unknown-fields".to_string(),
            serde_json::Value::Bool(true),
        );
        Schema::Object(schema)
    }
}
