//! Read-only views over parsed text documents.
//!
//! JSON and YAML parse into different dynamic value types. [`DocValue`] gives
//! both the same shape so that packing and reading share one walk. YAML can
//! spell non-finite floats (`.nan`, `.inf`), JSON cannot; the view keeps them.

use super::{ArrayData, Leaf, NdArray};
use serde_json::Value as Json;
use std::borrow::Cow;

/// A number as parsed, before a leaf type is chosen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Num {
    Int(i64),
    /// Only for values above `i64::MAX`.
    UInt(u64),
    Float(f64),
}

impl Num {
    fn as_u64(self) -> Option<u64> {
        match self {
            Num::Int(i) => u64::try_from(i).ok(),
            Num::UInt(u) => Some(u),
            Num::Float(_) => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::UInt(u) => u as f64,
            Num::Float(f) => f,
        }
    }

    /// Integers pack as `Int64` (`UInt64` above `i64::MAX`), the rest as
    /// `Float64`.
    pub(crate) fn into_leaf(self) -> Leaf {
        match self {
            Num::Int(i) => Leaf::Int64(i),
            Num::UInt(u) => Leaf::UInt64(u),
            Num::Float(f) => Leaf::Float64(f),
        }
    }
}

impl From<&serde_json::Number> for Num {
    fn from(n: &serde_json::Number) -> Self {
        if let Some(i) = n.as_i64() {
            Num::Int(i)
        } else if let Some(u) = n.as_u64() {
            Num::UInt(u)
        } else {
            Num::Float(n.as_f64().unwrap_or(f64::NAN))
        }
    }
}

#[cfg(feature = "io-yaml")]
impl From<&serde_yaml::Number> for Num {
    fn from(n: &serde_yaml::Number) -> Self {
        if let Some(i) = n.as_i64() {
            Num::Int(i)
        } else if let Some(u) = n.as_u64() {
            Num::UInt(u)
        } else {
            Num::Float(n.as_f64().unwrap_or(f64::NAN))
        }
    }
}

/// One level of a document.
pub(crate) enum DocView<'a, T> {
    /// Members in document order. `None` keys have no string form.
    Map(Vec<(Option<Cow<'a, str>>, &'a T)>),
    Seq(&'a [T]),
    Num(Num),
    Str(&'a str),
    Bool(bool),
    Null,
}

pub(crate) trait DocValue: Sized {
    fn view(&self) -> DocView<'_, Self>;
}

impl DocValue for Json {
    fn view(&self) -> DocView<'_, Self> {
        match self {
            Json::Object(map) => DocView::Map(
                map.iter()
                    .map(|(k, v)| (Some(Cow::Borrowed(k.as_str())), v))
                    .collect(),
            ),
            Json::Array(items) => DocView::Seq(items),
            Json::Number(n) => DocView::Num(n.into()),
            Json::String(s) => DocView::Str(s),
            Json::Bool(b) => DocView::Bool(*b),
            Json::Null => DocView::Null,
        }
    }
}

#[cfg(feature = "io-yaml")]
impl DocValue for serde_yaml::Value {
    fn view(&self) -> DocView<'_, Self> {
        use serde_yaml::Value as Yaml;
        match self {
            Yaml::Mapping(map) => DocView::Map(
                map.iter()
                    .map(|(k, v)| {
                        let key = match k {
                            Yaml::String(s) => Some(Cow::Borrowed(s.as_str())),
                            Yaml::Number(n) => Some(Cow::Owned(n.to_string())),
                            Yaml::Bool(b) => Some(Cow::Owned(b.to_string())),
                            _ => None,
                        };
                        (key, v)
                    })
                    .collect(),
            ),
            Yaml::Sequence(items) => DocView::Seq(items),
            Yaml::Number(n) => DocView::Num(n.into()),
            Yaml::String(s) => DocView::Str(s),
            Yaml::Bool(b) => DocView::Bool(*b),
            Yaml::Null => DocView::Null,
            Yaml::Tagged(tagged) => tagged.value.view(),
        }
    }
}

/// Interpret a sequence as a rectangular numeric array, if it is one.
pub(crate) fn numeric_array<T: DocValue>(items: &[T]) -> Option<NdArray> {
    let mut shape = Vec::new();
    let mut flat = Vec::new();
    let mut leaf_depth = None;
    if !flatten(items, 0, &mut shape, &mut leaf_depth, &mut flat) {
        return None;
    }
    if shape.iter().product::<usize>() != flat.len() {
        return None;
    }
    let data = if flat.iter().all(|n| matches!(n, Num::Int(_))) {
        ArrayData::I64(
            flat.iter()
                .filter_map(|n| match n {
                    Num::Int(i) => Some(*i),
                    _ => None,
                })
                .collect(),
        )
    } else if flat.iter().all(|n| n.as_u64().is_some()) {
        ArrayData::U64(flat.iter().filter_map(|n| n.as_u64()).collect())
    } else {
        ArrayData::F64(flat.iter().map(|n| n.as_f64()).collect())
    };
    NdArray::new(shape, data)
}

fn flatten<T: DocValue>(
    items: &[T],
    depth: usize,
    shape: &mut Vec<usize>,
    leaf_depth: &mut Option<usize>,
    flat: &mut Vec<Num>,
) -> bool {
    if shape.len() == depth {
        shape.push(items.len());
    } else if shape[depth] != items.len() {
        return false;
    }
    for item in items {
        match item.view() {
            DocView::Num(n) => {
                if *leaf_depth.get_or_insert(depth) != depth {
                    return false;
                }
                flat.push(n);
            }
            DocView::Seq(inner) => {
                if leaf_depth.is_some_and(|d| d <= depth) {
                    return false;
                }
                if !flatten(inner, depth + 1, shape, leaf_depth, flat) {
                    return false;
                }
            }
            _ => return false,
        }
    }
    true
}
