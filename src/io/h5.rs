//! HDF5 protocol (`.hdf5`, `.h5`), feature `io-hdf5`.
//!
//! Nodes are groups and leaves are datasets named by their keys. Scalars are
//! scalar datasets, arrays keep their shape, strings are variable-length UTF-8
//! and [`Leaf::Null`] is an empty scalar carrying a `sheaf_null` attribute.
//! HDF5 lists group members by name, so each group stores its key order in a
//! `sheaf_order` attribute (a JSON list); groups without one read back in name
//! order.
//!
//! With [`SaveOptions`], arrays whose size reaches
//! [`SaveOptions::chunk_threshold`] bytes are stored as a single chunk and,
//! when a codec is named, pass through the deflate filter. Deflate is the
//! filter every libhdf5 build ships, so every codec name maps onto it.
//!
//! Opening reads the whole file into a [`MemoryHandle`].

use super::{Backend, Handle, MemoryHandle, Protocol, SaveOptions};
use crate::error::{Result, SheafError};
use crate::tree::{ArrayData, Leaf, NdArray, Node, Value};
use hdf5::types::{FloatSize, IntSize, TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::{Dataset, File, Group, H5Type, Location};
use std::collections::HashSet;
use std::path::Path;

const ORDER_ATTR: &str = "sheaf_order";
const NULL_ATTR: &str = "sheaf_null";
const DEFLATE_LEVEL: u8 = 4;

pub struct Hdf5Backend;

impl Backend for Hdf5Backend {
    fn protocol(&self) -> Protocol {
        Protocol::Hdf5
    }

    fn supports_options(&self) -> bool {
        true
    }

    fn save(&self, node: &Node, path: &Path, options: Option<&SaveOptions>) -> Result<()> {
        let deflate = options.and_then(|o| o.compression.as_deref()).map(|name| {
            if name != "gzip" {
                tracing::debug!(codec = name, "hdf5 compresses with deflate");
            }
            DEFLATE_LEVEL
        });
        let writer = Writer {
            file: path,
            threshold: options.map_or(usize::MAX, |o| o.chunk_threshold),
            deflate,
        };
        let file = h5(path, File::create(path))?;
        writer.write_group(&file, node)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Handle>> {
        let file = h5(path, File::open(path))?;
        let root = read_group(path, &file)?;
        Ok(Box::new(MemoryHandle::new(path, root)))
    }
}

fn h5<T>(file: &Path, r: hdf5::Result<T>) -> Result<T> {
    r.map_err(|e| SheafError::malformed(file, e))
}

struct Writer<'a> {
    file: &'a Path,
    threshold: usize,
    deflate: Option<u8>,
}

impl Writer<'_> {
    fn write_group(&self, group: &Group, node: &Node) -> Result<()> {
        for (key, value) in node.iter() {
            match value {
                Value::Node(child) => {
                    let sub = h5(self.file, group.create_group(key))?;
                    self.write_group(&sub, child)?;
                }
                Value::Leaf(leaf) => self.write_leaf(group, key, leaf)?,
            }
        }
        let order = serde_json::to_string(&node.child_names())
            .map_err(|e| SheafError::malformed(self.file, e))?;
        let order = self.varlen(&order)?;
        let attr = h5(self.file, group.new_attr::<VarLenUnicode>().shape(()).create(ORDER_ATTR))?;
        h5(self.file, attr.write_scalar(&order))
    }

    fn varlen(&self, s: &str) -> Result<VarLenUnicode> {
        s.parse::<VarLenUnicode>().map_err(|e| SheafError::malformed(self.file, e))
    }

    fn write_leaf(&self, group: &Group, key: &str, leaf: &Leaf) -> Result<()> {
        match leaf {
            Leaf::Int32(v) => self.scalar(group, key, v),
            Leaf::Int64(v) => self.scalar(group, key, v),
            Leaf::UInt32(v) => self.scalar(group, key, v),
            Leaf::UInt64(v) => self.scalar(group, key, v),
            Leaf::Float32(v) => self.scalar(group, key, v),
            Leaf::Float64(v) => self.scalar(group, key, v),
            Leaf::Str(s) => self.scalar(group, key, &self.varlen(s)?),
            Leaf::Null => {
                let ds = h5(self.file, group.new_dataset::<u8>().shape(()).create(key))?;
                h5(self.file, ds.new_attr::<u8>().shape(()).create(NULL_ATTR)).map(|_| ())
            }
            Leaf::Array(a) => match a.data() {
                ArrayData::I32(d) => self.array(group, key, a.shape(), d),
                ArrayData::I64(d) => self.array(group, key, a.shape(), d),
                ArrayData::U32(d) => self.array(group, key, a.shape(), d),
                ArrayData::U64(d) => self.array(group, key, a.shape(), d),
                ArrayData::F32(d) => self.array(group, key, a.shape(), d),
                ArrayData::F64(d) => self.array(group, key, a.shape(), d),
            },
        }
    }

    fn scalar<T: H5Type>(&self, group: &Group, key: &str, v: &T) -> Result<()> {
        let ds = h5(self.file, group.new_dataset::<T>().shape(()).create(key))?;
        h5(self.file, ds.write_scalar(v))
    }

    fn array<T: H5Type>(&self, group: &Group, key: &str, shape: &[usize], data: &[T]) -> Result<()> {
        let mut builder = group.new_dataset::<T>().shape(shape.to_vec());
        // Chunk extents must be positive.
        if !data.is_empty() && std::mem::size_of_val(data) >= self.threshold {
            builder = builder.chunk(shape.to_vec());
            if let Some(level) = self.deflate {
                builder = builder.deflate(level);
            }
        }
        let ds = h5(self.file, builder.create(key))?;
        if data.is_empty() {
            return Ok(());
        }
        h5(self.file, ds.write_raw(data))
    }
}

fn has_attr(file: &Path, loc: &Location, name: &str) -> Result<bool> {
    Ok(h5(file, loc.attr_names())?.iter().any(|a| a == name))
}

fn read_group(file: &Path, group: &Group) -> Result<Node> {
    let datasets: HashSet<String> = h5(file, group.datasets())?
        .iter()
        .filter_map(|d| d.name().rsplit('/').next().map(str::to_string))
        .collect();
    let mut names = h5(file, group.member_names())?;
    if has_attr(file, group, ORDER_ATTR)? {
        let attr = h5(file, group.attr(ORDER_ATTR))?;
        let order = h5(file, attr.read_scalar::<VarLenUnicode>())?;
        let listed: Vec<String> =
            serde_json::from_str(order.as_str()).map_err(|e| SheafError::malformed(file, e))?;
        let mut ordered: Vec<String> = listed.into_iter().filter(|n| names.contains(n)).collect();
        names.retain(|n| !ordered.contains(n));
        ordered.append(&mut names);
        names = ordered;
    }

    let mut node = Node::new();
    for name in names {
        let value = if datasets.contains(&name) {
            let ds = h5(file, group.dataset(&name))?;
            Value::Leaf(read_leaf(file, &ds)?)
        } else {
            let sub = h5(file, group.group(&name))?;
            Value::Node(read_group(file, &sub)?)
        };
        node.insert(name, value);
    }
    Ok(node)
}

fn read_leaf(file: &Path, ds: &Dataset) -> Result<Leaf> {
    if has_attr(file, ds, NULL_ATTR)? {
        return Ok(Leaf::Null);
    }
    let descriptor = h5(file, h5(file, ds.dtype())?.to_descriptor())?;
    let scalar = ds.is_scalar();
    macro_rules! numeric {
        ($t:ty, $leaf:ident, $data:ident) => {
            if scalar {
                Leaf::$leaf(h5(file, ds.read_scalar::<$t>())?)
            } else {
                let shape = ds.shape();
                let data = h5(file, ds.read_raw::<$t>())?;
                NdArray::new(shape.clone(), ArrayData::$data(data))
                    .map(Leaf::Array)
                    .ok_or_else(|| {
                        SheafError::malformed(file, format!("{}: shape {shape:?} does not cover the data", ds.name()))
                    })?
            }
        };
    }
    Ok(match descriptor {
        TypeDescriptor::Integer(IntSize::U8) => numeric!(i64, Int64, I64),
        TypeDescriptor::Integer(_) => numeric!(i32, Int32, I32),
        TypeDescriptor::Unsigned(IntSize::U8) => numeric!(u64, UInt64, U64),
        TypeDescriptor::Unsigned(_) => numeric!(u32, UInt32, U32),
        TypeDescriptor::Float(FloatSize::U8) => numeric!(f64, Float64, F64),
        TypeDescriptor::Float(_) => numeric!(f32, Float32, F32),
        TypeDescriptor::VarLenUnicode if scalar => {
            Leaf::Str(h5(file, ds.read_scalar::<VarLenUnicode>())?.as_str().to_string())
        }
        TypeDescriptor::VarLenAscii if scalar => {
            Leaf::Str(h5(file, ds.read_scalar::<VarLenAscii>())?.as_str().to_string())
        }
        other => {
            return Err(SheafError::UnsupportedLeafType {
                key: ds.name(),
                kind: format!("hdf5 {other:?}"),
            });
        }
    })
}
