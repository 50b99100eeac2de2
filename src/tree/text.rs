//! Text representation shared by the JSON and YAML protocols.
//!
//! Nodes serialize as mappings, scalars as numbers or strings, [`Leaf::Null`]
//! as the format's null, and arrays as nested sequences following their shape.
//! Reading goes through the parsed document (`serde_json::Value` or
//! `serde_yaml::Value`): numeric rectangular sequences come back as array
//! leaves (`int64` when every element is an integer, `float64` otherwise),
//! other sequences as nodes keyed `"0"`, `"1"`, ….
//!
//! Non-finite floats have no JSON spelling and are written as null, so a NaN
//! saved to `.json` reads back as [`Leaf::Null`] (and an array holding one
//! reads back as a node of its elements). YAML writes `.nan`/`.inf` and reads
//! them back as floats.

use super::doc::{DocValue, DocView, numeric_array};
use super::{ArrayData, Leaf, Node, Value, join_path};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Node(n) => n.serialize(serializer),
            Value::Leaf(l) => l.serialize(serializer),
        }
    }
}

impl Serialize for Leaf {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Leaf::Int32(v) => serializer.serialize_i32(*v),
            Leaf::Int64(v) => serializer.serialize_i64(*v),
            Leaf::UInt32(v) => serializer.serialize_u32(*v),
            Leaf::UInt64(v) => serializer.serialize_u64(*v),
            Leaf::Float32(v) => serializer.serialize_f32(*v),
            Leaf::Float64(v) => serializer.serialize_f64(*v),
            Leaf::Str(s) => serializer.serialize_str(s),
            Leaf::Null => serializer.serialize_unit(),
            Leaf::Array(a) => {
                let shape = a.shape();
                match a.data() {
                    ArrayData::I32(d) => Nested { shape, data: d }.serialize(serializer),
                    ArrayData::I64(d) => Nested { shape, data: d }.serialize(serializer),
                    ArrayData::U32(d) => Nested { shape, data: d }.serialize(serializer),
                    ArrayData::U64(d) => Nested { shape, data: d }.serialize(serializer),
                    ArrayData::F32(d) => Nested { shape, data: d }.serialize(serializer),
                    ArrayData::F64(d) => Nested { shape, data: d }.serialize(serializer),
                }
            }
        }
    }
}

/// Row-major data viewed as nested sequences.
struct Nested<'a, T> {
    shape: &'a [usize],
    data: &'a [T],
}

impl<T: Serialize> Serialize for Nested<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let Some((&n, rest)) = self.shape.split_first() else {
            return self.data[0].serialize(serializer);
        };
        let stride: usize = rest.iter().product();
        let mut seq = serializer.serialize_seq(Some(n))?;
        for i in 0..n {
            if rest.is_empty() {
                seq.serialize_element(&self.data[i])?;
            } else {
                seq.serialize_element(&Nested {
                    shape: rest,
                    data: &self.data[i * stride..(i + 1) * stride],
                })?;
            }
        }
        seq.end()
    }
}

/// Build a tree from a parsed text document. The document root must be a
/// mapping. Keys containing `/` are paths into nested nodes. Booleans have no
/// leaf representation and are skipped with a warning.
pub(crate) fn node_from_doc<T: DocValue>(doc: &T) -> Option<Node> {
    match doc.view() {
        DocView::Map(_) => match value_from_doc("", doc) {
            Some(Value::Node(n)) => Some(n),
            _ => None,
        },
        DocView::Null => Some(Node::new()),
        _ => None,
    }
}

fn value_from_doc<T: DocValue>(key: &str, doc: &T) -> Option<Value> {
    let value = match doc.view() {
        DocView::Map(members) => {
            let mut node = Node::new();
            for (k, v) in members {
                let Some(k) = k else {
                    tracing::warn!(key, "skipping member whose key is not a string");
                    continue;
                };
                if let Some(v) = value_from_doc(&join_path(key, &k), v) {
                    node.merge_path(&k, v);
                }
            }
            Value::Node(node)
        }
        DocView::Seq(items) => match numeric_array(items) {
            Some(array) => Value::Leaf(Leaf::Array(array)),
            None => Value::Node(
                items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, v)| {
                        let k = i.to_string();
                        value_from_doc(&join_path(key, &k), v).map(|v| (k, v))
                    })
                    .collect(),
            ),
        },
        DocView::Num(n) => Value::Leaf(n.into_leaf()),
        DocView::Str(s) => Value::Leaf(Leaf::Str(s.to_string())),
        DocView::Null => Value::Leaf(Leaf::Null),
        DocView::Bool(_) => {
            tracing::warn!(key, "skipping boolean with no leaf representation");
            return None;
        }
    };
    Some(value)
}
