//! JSON and YAML backends.
//!
//! Text protocols cannot be read partially: opening a file parses it once into
//! a [`MemoryHandle`]. Saves ignore [`SaveOptions`].
//!
//! JSON has no spelling for NaN or infinities; they are written as `null` and
//! read back as [`crate::tree::Leaf::Null`]. YAML keeps them (`.nan`, `.inf`).

use super::{Backend, Handle, MemoryHandle, Protocol, SaveOptions};
use crate::error::{Result, SheafError};
use crate::tree::{DocValue, Node, node_from_doc};
use serde_json::Value as Json;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

fn create(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| SheafError::io(format!("create {}", path.display()), e))
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| SheafError::io(format!("open {}", path.display()), e))
}

fn into_handle<T: DocValue>(path: &Path, doc: &T) -> Result<Box<dyn Handle>> {
    let root = node_from_doc(doc)
        .ok_or_else(|| SheafError::malformed(path, "document root is not a mapping"))?;
    Ok(Box::new(MemoryHandle::new(path, root)))
}

pub struct JsonBackend;

impl Backend for JsonBackend {
    fn protocol(&self) -> Protocol {
        Protocol::Json
    }

    fn save(&self, node: &Node, path: &Path, _options: Option<&SaveOptions>) -> Result<()> {
        let mut w = create(path)?;
        serde_json::to_writer_pretty(&mut w, node).map_err(|e| SheafError::malformed(path, e))?;
        w.write_all(b"\n")
            .and_then(|_| w.flush())
            .map_err(|e| SheafError::io(format!("write {}", path.display()), e))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Handle>> {
        let doc: Json = serde_json::from_reader(open(path)?).map_err(|e| SheafError::malformed(path, e))?;
        into_handle(path, &doc)
    }
}

#[cfg(feature = "io-yaml")]
pub struct YamlBackend;

#[cfg(feature = "io-yaml")]
impl Backend for YamlBackend {
    fn protocol(&self) -> Protocol {
        Protocol::Yaml
    }

    fn save(&self, node: &Node, path: &Path, _options: Option<&SaveOptions>) -> Result<()> {
        let mut w = create(path)?;
        serde_yaml::to_writer(&mut w, node).map_err(|e| SheafError::malformed(path, e))?;
        w.flush()
            .map_err(|e| SheafError::io(format!("write {}", path.display()), e))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Handle>> {
        let doc: serde_yaml::Value =
            serde_yaml::from_reader(open(path)?).map_err(|e| SheafError::malformed(path, e))?;
        into_handle(path, &doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Leaf;

    #[test]
    fn json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        let mut node = Node::new();
        node.insert_path("a/b", 3i64);
        node.insert_path("a/c", vec![1.0, f64::NAN]);
        JsonBackend.save(&node, &path, None).unwrap();
        let back = JsonBackend.open(&path).unwrap().read_all().unwrap();
        assert_eq!(back.get("a/b").and_then(|v| v.as_leaf()), Some(&Leaf::Int64(3)));
        // NaN has no JSON spelling; the array comes back as a list with a null.
        assert!(back.has_path("a/c/1"));
    }

    #[test]
    fn non_mapping_root_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            JsonBackend.open(&path).err(),
            Some(SheafError::Malformed { .. })
        ));
    }

    #[cfg(feature = "io-yaml")]
    #[test]
    fn yaml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.yaml");
        let mut node = Node::new();
        node.insert_path("s1/x", 1.5);
        node.insert_path("s1/name", "run");
        node.insert_path("s1/missing", f64::NAN);
        YamlBackend.save(&node, &path, None).unwrap();
        let back = YamlBackend.open(&path).unwrap().read_all().unwrap();
        assert!(back.leaves_approx_eq(&node, 0.0));
        assert!(matches!(back.get("s1/missing").and_then(|v| v.as_leaf()), Some(Leaf::Float64(v)) if v.is_nan()));
    }
}
