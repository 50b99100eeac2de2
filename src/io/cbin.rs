//! Raw binary protocol (`.cbin`).
//!
//! A saved tree is two files: `<name>.cbin` holds the leaf bytes back to back
//! (little-endian), and `<name>.cbin_json` describes the layout. The side-car
//! lists every node and leaf in depth-first order, so a handle can enumerate
//! children and read single leaves without touching the rest of the blob.
//!
//! ```json
//! {
//!   "format": "sheaf-cbin/1",
//!   "entries": [
//!     { "path": "run_0" },
//!     { "path": "run_0/x", "leaf": { "dtype": "float64", "number_of_elements": 1,
//!       "offset": 0, "stride": 8, "element_bytes": 8, "endianness": "little" } }
//!   ]
//! }
//! ```
//!
//! With [`SaveOptions`], leaves whose encoded size reaches
//! [`SaveOptions::chunk_threshold`] bytes are compressed individually with the
//! named codec and carry `compression` and `compressed_bytes` in their layout.

use super::compression::{CompressionCodec, CompressionRegistry};
use super::{Backend, Handle, Protocol, SaveOptions};
use crate::error::{Result, SheafError};
use crate::tree::{ArrayData, Leaf, NdArray, Node, Value, join_path, segments};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const FORMAT: &str = "sheaf-cbin/1";

/// Where and how one leaf is stored in the blob.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeafLayout {
    pub dtype: String,
    pub number_of_elements: usize,
    pub offset: u64,
    pub stride: usize,
    pub element_bytes: usize,
    pub endianness: String,
    /// Present for arrays; scalars have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
    /// Stored size when compressed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed_bytes: Option<u64>,
}

impl LeafLayout {
    fn stored_bytes(&self) -> u64 {
        self.compressed_bytes
            .unwrap_or((self.number_of_elements * self.element_bytes) as u64)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Entry {
    path: String,
    /// Absent for interior nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    leaf: Option<LeafLayout>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Layout {
    format: String,
    entries: Vec<Entry>,
}

/// Path of the layout side-car for `path`.
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push("_json");
    PathBuf::from(s)
}

pub struct CbinBackend {
    codecs: Arc<CompressionRegistry>,
}

impl CbinBackend {
    pub fn new(codecs: Arc<CompressionRegistry>) -> Self {
        Self { codecs }
    }
}

impl Backend for CbinBackend {
    fn protocol(&self) -> Protocol {
        Protocol::ConduitBin
    }

    fn supports_options(&self) -> bool {
        true
    }

    fn save(&self, node: &Node, path: &Path, options: Option<&SaveOptions>) -> Result<()> {
        let codec = match options.and_then(|o| o.compression.as_deref()) {
            Some(name) => {
                let codec = self.codecs.get(name);
                if codec.is_none() {
                    tracing::warn!(codec = name, file = %path.display(), "unknown compression codec; storing raw");
                }
                codec
            }
            None => None,
        };
        let threshold = options.map_or(usize::MAX, |o| o.chunk_threshold);

        let file = File::create(path).map_err(|e| SheafError::io(format!("create {}", path.display()), e))?;
        let mut writer = BlobWriter {
            file: path,
            blob: BufWriter::new(file),
            offset: 0,
            codec: codec.as_deref(),
            threshold,
            entries: Vec::new(),
        };
        writer.write_node("", node)?;
        writer
            .blob
            .flush()
            .map_err(|e| SheafError::io(format!("write {}", path.display()), e))?;
        let entries = writer.entries;

        let sidecar = sidecar_path(path);
        let out = File::create(&sidecar).map_err(|e| SheafError::io(format!("create {}", sidecar.display()), e))?;
        let layout = Layout {
            format: FORMAT.to_string(),
            entries,
        };
        let mut w = BufWriter::new(out);
        serde_json::to_writer_pretty(&mut w, &layout).map_err(|e| SheafError::malformed(&sidecar, e))?;
        w.flush()
            .map_err(|e| SheafError::io(format!("write {}", sidecar.display()), e))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Handle>> {
        let sidecar = sidecar_path(path);
        let file = File::open(&sidecar)
            .map_err(|_| SheafError::malformed(path, format!("missing layout side-car {}", sidecar.display())))?;
        let layout: Layout =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| SheafError::malformed(&sidecar, e))?;
        if layout.format != FORMAT {
            return Err(SheafError::malformed(&sidecar, format!("unknown layout format '{}'", layout.format)));
        }
        Ok(Box::new(CbinHandle::new(
            path.to_path_buf(),
            layout.entries,
            Arc::clone(&self.codecs),
        )))
    }
}

/// Writes leaves in depth-first order, recording one entry per node and leaf.
struct BlobWriter<'a> {
    file: &'a Path,
    blob: BufWriter<File>,
    offset: u64,
    codec: Option<&'a dyn CompressionCodec>,
    threshold: usize,
    entries: Vec<Entry>,
}

impl BlobWriter<'_> {
    fn write_node(&mut self, prefix: &str, node: &Node) -> Result<()> {
        for (key, value) in node.iter() {
            let path = join_path(prefix, key);
            match value {
                Value::Node(child) => {
                    self.entries.push(Entry {
                        path: path.clone(),
                        leaf: None,
                    });
                    self.write_node(&path, child)?;
                }
                Value::Leaf(leaf) => {
                    let layout = self.write_leaf(&path, leaf)?;
                    self.entries.push(Entry {
                        path,
                        leaf: Some(layout),
                    });
                }
            }
        }
        Ok(())
    }

    fn write_leaf(&mut self, key: &str, leaf: &Leaf) -> Result<LeafLayout> {
        let (mut layout, raw) = encode(leaf, self.offset);
        let bytes = match self.codec {
            Some(c) if raw.len() >= self.threshold => {
                let packed = c
                    .compress(&raw)
                    .map_err(|e| SheafError::io(format!("compress {key}"), e))?;
                layout.compression = Some(c.name().to_string());
                layout.compressed_bytes = Some(packed.len() as u64);
                packed
            }
            _ => raw,
        };
        self.blob
            .write_all(&bytes)
            .map_err(|e| SheafError::io(format!("write {}", self.file.display()), e))?;
        self.offset += bytes.len() as u64;
        Ok(layout)
    }
}

fn encode(leaf: &Leaf, offset: u64) -> (LeafLayout, Vec<u8>) {
    fn layout(dtype: &str, n: usize, width: usize, offset: u64) -> LeafLayout {
        LeafLayout {
            dtype: dtype.to_string(),
            number_of_elements: n,
            offset,
            stride: width,
            element_bytes: width,
            endianness: "little".to_string(),
            shape: None,
            compression: None,
            compressed_bytes: None,
        }
    }
    macro_rules! le {
        ($vals:expr) => {
            $vals.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<u8>>()
        };
    }
    match leaf {
        Leaf::Int32(v) => (layout("int32", 1, 4, offset), v.to_le_bytes().to_vec()),
        Leaf::Int64(v) => (layout("int64", 1, 8, offset), v.to_le_bytes().to_vec()),
        Leaf::UInt32(v) => (layout("uint32", 1, 4, offset), v.to_le_bytes().to_vec()),
        Leaf::UInt64(v) => (layout("uint64", 1, 8, offset), v.to_le_bytes().to_vec()),
        Leaf::Float32(v) => (layout("float32", 1, 4, offset), v.to_le_bytes().to_vec()),
        Leaf::Float64(v) => (layout("float64", 1, 8, offset), v.to_le_bytes().to_vec()),
        Leaf::Str(s) => (layout("char8_str", s.len(), 1, offset), s.as_bytes().to_vec()),
        Leaf::Null => (layout("empty", 0, 0, offset), Vec::new()),
        Leaf::Array(a) => {
            let data = a.data();
            let (width, bytes) = match data {
                ArrayData::I32(d) => (4, le!(d)),
                ArrayData::I64(d) => (8, le!(d)),
                ArrayData::U32(d) => (4, le!(d)),
                ArrayData::U64(d) => (8, le!(d)),
                ArrayData::F32(d) => (4, le!(d)),
                ArrayData::F64(d) => (8, le!(d)),
            };
            let mut l = layout(data.dtype(), data.len(), width, offset);
            l.shape = Some(a.shape().to_vec());
            (l, bytes)
        }
    }
}

fn decode(file: &Path, key: &str, layout: &LeafLayout, bytes: &[u8]) -> Result<Leaf> {
    let bad = |reason: String| SheafError::malformed(file, format!("{key}: {reason}"));
    let expected = layout.number_of_elements * layout.element_bytes;
    if bytes.len() != expected {
        return Err(bad(format!("expected {expected} bytes, found {}", bytes.len())));
    }
    if layout.endianness != "little" {
        return Err(bad(format!("unsupported endianness '{}'", layout.endianness)));
    }
    macro_rules! vals {
        ($t:ty) => {
            bytes
                .chunks_exact(std::mem::size_of::<$t>())
                .map(|c| <$t>::from_le_bytes(c.try_into().unwrap_or_default()))
                .collect::<Vec<$t>>()
        };
    }
    let data = match layout.dtype.as_str() {
        "char8_str" => {
            let s = String::from_utf8(bytes.to_vec()).map_err(|e| bad(e.to_string()))?;
            return Ok(Leaf::Str(s));
        }
        "empty" => return Ok(Leaf::Null),
        "int32" => ArrayData::I32(vals!(i32)),
        "int64" => ArrayData::I64(vals!(i64)),
        "uint32" => ArrayData::U32(vals!(u32)),
        "uint64" => ArrayData::U64(vals!(u64)),
        "float32" => ArrayData::F32(vals!(f32)),
        "float64" => ArrayData::F64(vals!(f64)),
        other => return Err(bad(format!("unknown dtype '{other}'"))),
    };
    match &layout.shape {
        Some(shape) => NdArray::new(shape.clone(), data)
            .map(Leaf::Array)
            .ok_or_else(|| bad(format!("shape {shape:?} does not cover the data"))),
        None => scalar(data).ok_or_else(|| bad("scalar leaf without exactly one element".to_string())),
    }
}

fn scalar(data: ArrayData) -> Option<Leaf> {
    Some(match data {
        ArrayData::I32(d) => Leaf::Int32(*d.first()?),
        ArrayData::I64(d) => Leaf::Int64(*d.first()?),
        ArrayData::U32(d) => Leaf::UInt32(*d.first()?),
        ArrayData::U64(d) => Leaf::UInt64(*d.first()?),
        ArrayData::F32(d) => Leaf::Float32(*d.first()?),
        ArrayData::F64(d) => Leaf::Float64(*d.first()?),
    })
}

/// Lazy handle: structure comes from the side-car, leaf bytes are read on
/// demand.
pub struct CbinHandle {
    file: PathBuf,
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    codecs: Arc<CompressionRegistry>,
}

impl CbinHandle {
    fn new(file: PathBuf, entries: Vec<Entry>, codecs: Arc<CompressionRegistry>) -> Self {
        let index = entries.iter().enumerate().map(|(i, e)| (e.path.clone(), i)).collect();
        Self {
            file,
            entries,
            index,
            codecs,
        }
    }

    fn normalize(path: &str) -> String {
        segments(path).collect::<Vec<_>>().join("/")
    }

    fn not_found(&self, path: &str) -> SheafError {
        SheafError::PathNotFound {
            file: self.file.clone(),
            path: path.to_string(),
        }
    }

    /// Entries strictly below `prefix`. Entries are in pre-order, so they
    /// follow the prefix's own entry contiguously.
    fn descendants(&self, prefix: &str) -> Result<&[Entry]> {
        if prefix.is_empty() {
            return Ok(&self.entries);
        }
        let &start = self.index.get(prefix).ok_or_else(|| self.not_found(prefix))?;
        let rest = &self.entries[start + 1..];
        let len = rest
            .iter()
            .take_while(|e| {
                e.path
                    .strip_prefix(prefix)
                    .is_some_and(|r| r.starts_with('/'))
            })
            .count();
        Ok(&rest[..len])
    }

    fn read_leaf(&self, blob: &mut File, key: &str, layout: &LeafLayout) -> Result<Leaf> {
        let ctx = || format!("read {} from {}", key, self.file.display());
        let mut stored = vec![0u8; layout.stored_bytes() as usize];
        blob.seek(SeekFrom::Start(layout.offset))
            .and_then(|_| blob.read_exact(&mut stored))
            .map_err(|e| SheafError::io(ctx(), e))?;
        let raw = match &layout.compression {
            Some(name) => {
                let codec = self
                    .codecs
                    .get(name)
                    .ok_or_else(|| SheafError::malformed(&self.file, format!("{key}: codec '{name}' not available")))?;
                codec.decompress(&stored).map_err(|e| SheafError::io(ctx(), e))?
            }
            None => stored,
        };
        decode(&self.file, key, layout, &raw)
    }

    fn open_blob(&self) -> Result<File> {
        File::open(&self.file).map_err(|e| SheafError::io(format!("open {}", self.file.display()), e))
    }

    /// Materialise every entry below `prefix` (`""` for the whole tree).
    fn read_subtree(&self, prefix: &str) -> Result<Node> {
        let mut blob = self.open_blob()?;
        let mut root = Node::new();
        let skip = if prefix.is_empty() { 0 } else { prefix.len() + 1 };
        for entry in self.descendants(prefix)? {
            let rel = &entry.path[skip..];
            match &entry.leaf {
                Some(layout) => root.insert_path(rel, self.read_leaf(&mut blob, &entry.path, layout)?),
                None => root.insert_path(rel, Node::new()),
            }
        }
        Ok(root)
    }
}

impl Handle for CbinHandle {
    fn file(&self) -> &Path {
        &self.file
    }

    fn child_names(&self, path: &str) -> Result<Vec<String>> {
        let path = Self::normalize(path);
        let skip = if path.is_empty() { 0 } else { path.len() + 1 };
        Ok(self
            .descendants(&path)?
            .iter()
            .map(|e| &e.path[skip..])
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect())
    }

    fn has_path(&self, path: &str) -> bool {
        self.index.contains_key(&Self::normalize(path))
    }

    fn read(&self, path: &str) -> Result<Value> {
        let path = Self::normalize(path);
        let &i = self.index.get(&path).ok_or_else(|| self.not_found(&path))?;
        match &self.entries[i].leaf {
            Some(layout) => {
                let mut blob = self.open_blob()?;
                Ok(Value::Leaf(self.read_leaf(&mut blob, &path, layout)?))
            }
            None => Ok(Value::Node(self.read_subtree(&path)?)),
        }
    }

    fn read_all(&self) -> Result<Node> {
        self.read_subtree("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Node {
        let mut node = Node::new();
        node.insert_path("run_0/inputs/x", 0.5);
        node.insert_path("run_0/inputs/n", 7i32);
        node.insert_path("run_0/label", "baseline");
        node.insert_path("run_0/empty", Node::new());
        node.insert_path("run_0/nothing", Leaf::Null);
        let m = NdArray::new(vec![2, 3], ArrayData::F32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])).unwrap();
        node.insert_path("run_1/m", m);
        node.insert_path("run_1/big", NdArray::vector(ArrayData::U64(vec![u64::MAX, 0])));
        node
    }

    #[test]
    fn round_trip_preserves_types_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.cbin");
        let backend = CbinBackend::new(Arc::new(CompressionRegistry::builtin()));
        let node = sample();
        backend.save(&node, &path, None).unwrap();
        assert!(sidecar_path(&path).exists());
        let back = backend.open(&path).unwrap().read_all().unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn handle_reads_structure_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.cbin");
        let backend = CbinBackend::new(Arc::new(CompressionRegistry::builtin()));
        backend.save(&sample(), &path, None).unwrap();
        let h = backend.open(&path).unwrap();
        assert_eq!(h.child_names("").unwrap(), ["run_0", "run_1"]);
        assert_eq!(h.child_names("/run_0").unwrap(), ["inputs", "label", "empty", "nothing"]);
        assert!(h.child_names("run_0/label").unwrap().is_empty());
        assert!(h.has_path("run_0/inputs/x"));
        assert!(!h.has_path("run_0/inputs/y"));
        assert_eq!(h.read("run_0/inputs/n").unwrap(), Value::Leaf(Leaf::Int32(7)));
        let sub = h.read("run_0/inputs").unwrap();
        assert_eq!(sub.as_node().map(Node::child_names), Some(vec!["x".to_string(), "n".to_string()]));
    }

    #[test]
    fn large_leaves_are_compressed() {
        struct Halve;
        impl CompressionCodec for Halve {
            fn name(&self) -> &str {
                "halve"
            }
            fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
                Ok(data.iter().step_by(2).copied().collect())
            }
            fn decompress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
                Ok(data.iter().flat_map(|&b| [b, b]).collect())
            }
        }
        let mut codecs = CompressionRegistry::new();
        codecs.register(Arc::new(Halve));
        let backend = CbinBackend::new(Arc::new(codecs));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.cbin");

        let mut node = Node::new();
        // Every byte pair is equal, so the toy codec is lossless here.
        node.insert("big", NdArray::vector(ArrayData::U32(vec![0x0101_0101; 1000])));
        node.insert("small", 3i64);
        let options = SaveOptions {
            compression: Some("halve".to_string()),
            chunk_threshold: 2000,
        };
        backend.save(&node, &path, Some(&options)).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 2000 + 8);

        let sidecar = std::fs::read_to_string(sidecar_path(&path)).unwrap();
        assert!(sidecar.contains("\"compression\": \"halve\""));
        assert_eq!(backend.open(&path).unwrap().read_all().unwrap(), node);
    }

    #[test]
    fn missing_sidecar_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lonely.cbin");
        std::fs::write(&path, b"").unwrap();
        let backend = CbinBackend::new(Arc::new(CompressionRegistry::new()));
        assert!(matches!(backend.open(&path).err(), Some(SheafError::Malformed { .. })));
    }
}
