//! In-memory hierarchical records.
//!
//! A [`Node`] is an ordered mapping from string keys to [`Value`]s, where a
//! value is either another node or a [`Leaf`]. Nodes own their children by
//! value, so a tree can neither alias a sub-tree under two parents nor contain
//! a cycle. Child keys are unique within a node and keep insertion order; that
//! order is the enumeration order of [`Node::child_names`], [`Node::walk`] and
//! every saved file.
//!
//! Paths are `/`-joined key sequences. Empty segments are ignored, so
//! `"a//b"`, `"/a/b"` and `"a/b"` address the same value.
//!
//! ```
//! use sheaf::tree::{Leaf, Node};
//!
//! let mut sample = Node::new();
//! sample.insert_path("inputs/x", 1.5);
//! sample.insert_path("outputs/y", vec![1.0, 2.0]);
//!
//! let paths: Vec<String> = sample.walk().map(|(p, _)| p).collect();
//! assert_eq!(paths, ["inputs/x", "outputs/y"]);
//! assert_eq!(sample.get("inputs/x").and_then(|v| v.as_leaf()), Some(&Leaf::Float64(1.5)));
//! ```

mod doc;
mod leaf;
mod pack;
mod text;

pub use leaf::{ArrayData, Leaf, NdArray};
pub use pack::{NullPolicy, PackError, Packed, pack, pack_columns, pack_with};
pub(crate) use doc::DocValue;
pub(crate) use text::node_from_doc;

use std::collections::HashMap;

/// Either an interior node or a leaf.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Node(Node),
    Leaf(Leaf),
}

impl Value {
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(n) => Some(n),
            Value::Leaf(_) => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&Leaf> {
        match self {
            Value::Leaf(l) => Some(l),
            Value::Node(_) => None,
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Value::Node(_))
    }
}

impl From<Node> for Value {
    fn from(n: Node) -> Self {
        Value::Node(n)
    }
}

impl From<Leaf> for Value {
    fn from(l: Leaf) -> Self {
        Value::Leaf(l)
    }
}

macro_rules! value_from_leaf {
    ($($t:ty),* $(,)?) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Leaf(Leaf::from(v))
            }
        })*
    };
}

value_from_leaf!(i32, i64, u32, u64, f32, f64, String, &str, NdArray, Vec<f64>, Vec<i64>);

/// Split a path into its non-empty segments.
pub(crate) fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Join two path fragments with a single `/`.
pub fn join_path(prefix: &str, key: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let key = key.trim_start_matches('/');
    match (prefix.is_empty(), key.is_empty()) {
        (true, _) => key.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{prefix}/{key}"),
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Node {
    entries: Vec<(String, Value)>,
    index: HashMap<String, usize>,
}

impl Node {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of immediate children.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Immediate child keys in insertion order.
    pub fn child_names(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Immediate children in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Immediate child by key (no path splitting).
    pub fn child(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    fn child_mut(&mut self, key: &str) -> Option<&mut Value> {
        match self.index.get(key) {
            Some(&i) => Some(&mut self.entries[i].1),
            None => None,
        }
    }

    /// Value at `path`. A path with no segments has no value (use
    /// [`Node::get_node`] to address the node itself).
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segs = segments(path);
        let mut cur = self.child(segs.next()?)?;
        for seg in segs {
            cur = cur.as_node()?.child(seg)?;
        }
        Some(cur)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Value> {
        let mut segs = segments(path);
        let mut cur = self.child_mut(segs.next()?)?;
        for seg in segs {
            cur = match cur {
                Value::Node(n) => n.child_mut(seg)?,
                Value::Leaf(_) => return None,
            };
        }
        Some(cur)
    }

    /// Interior node at `path`; `""` and `"/"` return `self`.
    pub fn get_node(&self, path: &str) -> Option<&Node> {
        if segments(path).next().is_none() {
            return Some(self);
        }
        self.get(path)?.as_node()
    }

    pub fn has_path(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Insert or replace an immediate child, keeping the original position on
    /// replacement. Returns the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.index.get(&key) {
            Some(&i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Insert at a `/`-joined path, creating interior nodes as needed. A leaf
    /// standing where an interior node is required is replaced by a node.
    /// Paths with no segments are ignored.
    pub fn insert_path(&mut self, path: &str, value: impl Into<Value>) {
        let segs: Vec<&str> = segments(path).collect();
        let Some((last, parents)) = segs.split_last() else {
            return;
        };
        let mut cur = self;
        for seg in parents {
            if !matches!(cur.child(seg), Some(Value::Node(_))) {
                cur.insert(*seg, Node::new());
            }
            cur = match cur.child_mut(seg) {
                Some(Value::Node(n)) => n,
                _ => unreachable!("interior node was just inserted"),
            };
        }
        cur.insert(*last, value);
    }

    /// Like [`Node::insert_path`], except that a node arriving where a node
    /// already stands is merged into it child by child.
    pub fn merge_path(&mut self, path: &str, value: impl Into<Value>) {
        match value.into() {
            Value::Node(incoming) => match self.get_mut(path) {
                Some(Value::Node(existing)) => {
                    for (key, child) in incoming {
                        existing.merge_path(&key, child);
                    }
                }
                _ => self.insert_path(path, incoming),
            },
            leaf => self.insert_path(path, leaf),
        }
    }

    /// Remove an immediate child, preserving the order of the rest.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let i = self.index.remove(key)?;
        let (_, value) = self.entries.remove(i);
        for (k, _) in &self.entries[i..] {
            if let Some(slot) = self.index.get_mut(k) {
                *slot -= 1;
            }
        }
        Some(value)
    }

    /// Lazy depth-first iteration over every leaf below this node, yielding
    /// `(path, leaf)` with paths relative to this node. Each call starts a
    /// fresh traversal.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: vec![(String::new(), self.entries.iter())],
        }
    }

    /// True when both trees have the same leaf paths with leaves equal under
    /// [`Leaf::approx_eq`].
    pub fn leaves_approx_eq(&self, other: &Node, tol: f64) -> bool {
        let theirs: HashMap<String, &Leaf> = other.walk().collect();
        let mut count = 0usize;
        for (path, leaf) in self.walk() {
            count += 1;
            match theirs.get(&path) {
                Some(other_leaf) if leaf.approx_eq(other_leaf, tol) => {}
                _ => return false,
            }
        }
        count == theirs.len()
    }
}

impl IntoIterator for Node {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Node {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut node = Node::new();
        for (k, v) in iter {
            node.insert(k, v);
        }
        node
    }
}

/// Iterator returned by [`Node::walk`].
#[derive(Clone)]
pub struct Walk<'a> {
    stack: Vec<(String, std::slice::Iter<'a, (String, Value)>)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (String, &'a Leaf);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (prefix, iter) = self.stack.last_mut()?;
            let Some((key, value)) = iter.next() else {
                self.stack.pop();
                continue;
            };
            let path = join_path(prefix, key);
            match value {
                Value::Leaf(leaf) => return Some((path, leaf)),
                Value::Node(node) => self.stack.push((path, node.entries.iter())),
            }
        }
    }
}
