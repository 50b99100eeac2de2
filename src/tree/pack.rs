//! Packing dynamic values into trees.
//!
//! [`pack`] accepts any [`serde_json::Value`] (the dynamic value type used across
//! the crate) and never fails as a whole: values with no leaf representation are
//! dropped and reported per key in [`Packed::errors`].

use super::doc::{DocValue, DocView, numeric_array};
use super::{ArrayData, Leaf, NdArray, Node, Value, join_path};
use crate::columns::ColumnTable;
use crate::error::SheafError;
use serde_json::Value as Json;

/// How `null` is packed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NullPolicy {
    /// `null` becomes [`Leaf::Null`].
    #[default]
    Explicit,
    /// `null` becomes the string `"None"`. Indistinguishable from a genuine
    /// `"None"` string once packed.
    StringSentinel,
}

/// A value that could not be packed.
#[derive(Debug)]
pub struct PackError {
    /// Path of the offending key, relative to the packed root.
    pub key: String,
    pub error: SheafError,
}

/// Result of [`pack`]: the packed value (absent only when the root itself was
/// unsupported) plus one error per dropped key.
#[derive(Debug)]
pub struct Packed {
    pub value: Option<Value>,
    pub errors: Vec<PackError>,
}

impl Packed {
    /// The packed value as a node. Non-node roots are placed under `"value"`.
    pub fn into_node(self) -> Node {
        match self.value {
            Some(Value::Node(n)) => n,
            Some(leaf) => Node::from_iter([("value", leaf)]),
            None => Node::new(),
        }
    }
}

/// Pack with [`NullPolicy::Explicit`].
pub fn pack(value: &Json) -> Packed {
    pack_with(value, NullPolicy::Explicit)
}

/// Pack a dynamic value.
///
/// - objects become interior nodes; a key containing `/` is a path and
///   lands in (or creates) the nested nodes it names;
/// - rectangular numeric arrays become a node holding a flattened `data` leaf
///   and, when the array has more than one dimension, a `metadata/shape` leaf;
/// - other arrays become nodes with children `"0"`, `"1"`, … packed recursively;
/// - integers pack as `Int64` (`UInt64` when they exceed `i64::MAX`), other
///   numbers as `Float64`, strings as `Str`;
/// - `null` follows `nulls`;
/// - booleans have no leaf representation and are reported and dropped.
pub fn pack_with(value: &Json, nulls: NullPolicy) -> Packed {
    let mut errors = Vec::new();
    let value = pack_value("", value, nulls, &mut errors);
    Packed { value, errors }
}

fn pack_value<T: DocValue>(key: &str, value: &T, nulls: NullPolicy, errors: &mut Vec<PackError>) -> Option<Value> {
    match value.view() {
        DocView::Map(members) => {
            let mut node = Node::new();
            for (k, v) in members {
                let Some(k) = k else { continue };
                if let Some(packed) = pack_value(&join_path(key, &k), v, nulls, errors) {
                    // `a/b` keys address nested nodes, as in any other path.
                    node.merge_path(&k, packed);
                }
            }
            Some(Value::Node(node))
        }
        DocView::Seq(items) => match numeric_array(items) {
            Some(array) => Some(Value::Node(array_node(array))),
            None => {
                let mut node = Node::new();
                for (i, item) in items.iter().enumerate() {
                    let k = i.to_string();
                    if let Some(packed) = pack_value(&join_path(key, &k), item, nulls, errors) {
                        node.insert(k, packed);
                    }
                }
                Some(Value::Node(node))
            }
        },
        DocView::Num(n) => Some(Value::Leaf(n.into_leaf())),
        DocView::Str(s) => Some(Value::Leaf(Leaf::Str(s.to_string()))),
        DocView::Null => Some(Value::Leaf(match nulls {
            NullPolicy::Explicit => Leaf::Null,
            NullPolicy::StringSentinel => Leaf::Str("None".to_string()),
        })),
        DocView::Bool(b) => {
            let error = SheafError::UnsupportedLeafType {
                key: key.to_string(),
                kind: format!("bool ({b})"),
            };
            tracing::error!(key, %error, "dropping value with no leaf representation");
            errors.push(PackError {
                key: key.to_string(),
                error,
            });
            None
        }
    }
}

/// Node layout for an array: flattened `data`, plus `metadata/shape` above 1-d.
pub(crate) fn array_node(array: NdArray) -> Node {
    let (shape, data) = array.into_parts();
    let mut node = Node::new();
    node.insert("data", NdArray::vector(data));
    if shape.len() > 1 {
        let dims: Vec<u64> = shape.iter().map(|&d| d as u64).collect();
        node.insert_path("metadata/shape", NdArray::vector(ArrayData::U64(dims)));
    }
    node
}

/// Re-pack a column table as a tree: every column path holds the array layout
/// produced by [`pack`] for arrays.
pub fn pack_columns(table: &ColumnTable) -> Node {
    let mut root = Node::new();
    for (path, column) in table.iter() {
        let array = NdArray::new(column.shape().to_vec(), ArrayData::F64(column.data().to_vec()))
            .unwrap_or_else(|| NdArray::vector(ArrayData::F64(column.data().to_vec())));
        root.insert_path(path, array_node(array));
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn objects_become_nodes() {
        let packed = pack(&json!({"a": {"b": 1, "c": 2.5, "d": "s"}}));
        assert!(packed.errors.is_empty());
        let node = packed.into_node();
        assert_eq!(node.get("a/b").and_then(Value::as_leaf), Some(&Leaf::Int64(1)));
        assert_eq!(node.get("a/c").and_then(Value::as_leaf), Some(&Leaf::Float64(2.5)));
        assert_eq!(node.get("a/d").and_then(Value::as_leaf), Some(&Leaf::from("s")));
    }

    #[test]
    fn matrices_carry_shape_metadata() {
        let node = pack(&json!({"m": [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]], "v": [1, 2]})).into_node();
        let data = node.get("m/data").and_then(Value::as_leaf);
        assert_eq!(data.and_then(Leaf::to_f64_vec), Some(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
        let shape = node.get("m/metadata/shape").and_then(Value::as_leaf);
        assert_eq!(shape.and_then(Leaf::to_f64_vec), Some(vec![2.0, 3.0]));
        assert!(node.has_path("v/data"));
        assert!(!node.has_path("v/metadata"));
    }

    #[test]
    fn ragged_and_mixed_lists_are_enumerated() {
        let node = pack(&json!({"r": [[1, 2], [3]], "m": [1, [2]], "o": [{"x": 1}]})).into_node();
        assert!(node.has_path("r/0/data"));
        assert!(node.has_path("r/1/data"));
        assert!(node.has_path("m/0"));
        assert!(node.has_path("m/1/data"));
        assert!(node.has_path("o/0/x"));
    }

    #[test]
    fn nulls_follow_policy() {
        let value = json!({"n": null});
        let explicit = pack(&value).into_node();
        assert_eq!(explicit.get("n").and_then(Value::as_leaf), Some(&Leaf::Null));
        let legacy = pack_with(&value, NullPolicy::StringSentinel).into_node();
        assert_eq!(legacy.get("n").and_then(Value::as_leaf), Some(&Leaf::from("None")));
    }

    #[test]
    fn unsupported_values_are_reported_not_fatal() {
        let packed = pack(&json!({"ok": 1, "flag": true, "deep": {"f": false}}));
        let keys: Vec<&str> = packed.errors.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["flag", "deep/f"]);
        let node = packed.into_node();
        assert!(node.has_path("ok"));
        assert!(!node.has_path("flag"));
        assert!(node.get_node("deep").is_some_and(Node::is_empty));
    }

    #[test]
    fn slashed_keys_nest() {
        let node = pack(&json!({"s": {"outputs/y": 5, "outputs": {"z": 1}, "x": 2}})).into_node();
        assert_eq!(node.get("s/outputs/y").and_then(Value::as_leaf), Some(&Leaf::Int64(5)));
        assert_eq!(node.get("s/outputs/z").and_then(Value::as_leaf), Some(&Leaf::Int64(1)));
        let paths: Vec<String> = node.walk().map(|(p, _)| p).collect();
        assert_eq!(paths, ["s/outputs/y", "s/outputs/z", "s/x"]);
    }

    #[test]
    fn big_unsigned_integers_survive() {
        let node = pack(&json!({"u": u64::MAX})).into_node();
        assert_eq!(node.get("u").and_then(Value::as_leaf), Some(&Leaf::UInt64(u64::MAX)));
    }
}
