//! Loading and saving trees, with the protocol chosen from the file extension.
//!
//! | extension        | protocol     | backend                              |
//! |------------------|--------------|--------------------------------------|
//! | `.json`          | `json`       | [`text::JsonBackend`]                |
//! | `.yaml`, `.yml`  | `yaml`       | `text::YamlBackend` (feature `io-yaml`) |
//! | `.cbin`          | `cbin`       | [`cbin::CbinBackend`] (+ `_json` side-car) |
//! | `.hdf5`, `.h5`   | `hdf5`       | `h5::Hdf5Backend` (feature `io-hdf5`) |
//! | `.npz`           | `npz`        | column archives only, see [`npz`]    |
//!
//! A [`Codec`] owns the backend [`Registry`], which is built the first time the
//! codec is used. Every registry slot carries an `available` flag resolved from
//! the compiled features; asking for a protocol without a usable backend
//! yields [`SheafError::ProtocolUnavailable`] instead of a panic or a printed
//! warning.
//!
//! ```no_run
//! use sheaf::io::{Codec, SaveOptions};
//! use sheaf::tree::Node;
//! # fn main() -> Result<(), sheaf::SheafError> {
//! let codec = Codec::new();
//! let mut run = Node::new();
//! run.insert_path("run_0/inputs/x", 0.25);
//! codec.save(&run, "bundle.cbin", &SaveOptions::default())?;
//!
//! // Enumerate samples without reading them.
//! let handle = codec.load_handle("bundle.cbin")?;
//! assert_eq!(handle.child_names("")?, ["run_0"]);
//! # Ok(())
//! # }
//! ```

pub mod cbin;
pub mod compression;
pub mod glob;
#[cfg(feature = "io-hdf5")]
pub mod h5;
pub mod npz;
pub mod text;

use crate::error::{Result, SheafError};
use crate::tree::{Node, Value, segments};
use compression::CompressionRegistry;
use std::fmt;
use std::fs::create_dir_all;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// On-disk serialization protocol.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    Hdf5,
    Json,
    Yaml,
    /// Raw binary data with a JSON layout side-car.
    ConduitBin,
    /// Zipped numeric column archive.
    Npz,
    /// Any other extension, lower-cased.
    Other(String),
}

impl Protocol {
    pub fn name(&self) -> &str {
        match self {
            Protocol::Hdf5 => "hdf5",
            Protocol::Json => "json",
            Protocol::Yaml => "yaml",
            Protocol::ConduitBin => "cbin",
            Protocol::Npz => "npz",
            Protocol::Other(ext) => ext,
        }
    }

    /// Binary protocols whose saves take chunking/compression options.
    pub fn accepts_options(&self) -> bool {
        matches!(self, Protocol::Hdf5 | Protocol::ConduitBin)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Map a file name to its protocol. Case-insensitive; `.h5` is `hdf5`.
///
/// # Errors
/// [`SheafError::InvalidFormat`] when the file name has no extension.
pub fn determine_protocol(path: impl AsRef<Path>) -> Result<Protocol> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| SheafError::InvalidFormat(path.to_path_buf()))?;
    Ok(match ext.as_str() {
        "hdf5" | "h5" => Protocol::Hdf5,
        "json" => Protocol::Json,
        "yaml" | "yml" => Protocol::Yaml,
        "cbin" => Protocol::ConduitBin,
        "npz" => Protocol::Npz,
        _ => Protocol::Other(ext),
    })
}

/// Chunking/compression options for binary protocols.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveOptions {
    /// Codec name (see [`CompressionRegistry`]); `None` stores raw bytes.
    pub compression: Option<String>,
    /// Leaves whose encoded size reaches this many bytes are stored as
    /// individually compressed chunks.
    pub chunk_threshold: usize,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            compression: compression::default_codec_name().map(str::to_string),
            chunk_threshold: 2000,
        }
    }
}

impl SaveOptions {
    /// Options that store everything uncompressed.
    pub fn plain() -> Self {
        Self {
            compression: None,
            chunk_threshold: usize::MAX,
        }
    }
}

/// What [`Codec::save`] did with the options it was given.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveOutcome {
    pub protocol: Protocol,
    /// The backend received and honoured the options.
    pub options_applied: bool,
    /// The protocol takes options but the backend lacks the option surface,
    /// so an unoptioned save was performed instead.
    pub options_skipped: bool,
}

/// Which part of a file [`Codec::load`] materialises.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodePath<'a> {
    /// The whole tree.
    Root,
    /// The sub-tree (or leaf) at a path. `"/"` is the whole tree.
    At(&'a str),
    /// Nothing: return the open handle.
    Handle,
}

/// Result of [`Codec::load`].
pub enum Loaded {
    Value(Value),
    Handle(Box<dyn Handle>),
}

impl Loaded {
    /// The loaded value as a node; leaves and handles give `None`.
    pub fn into_node(self) -> Option<Node> {
        match self {
            Loaded::Value(Value::Node(n)) => Some(n),
            _ => None,
        }
    }
}

/// An open file that can answer structural questions without materialising
/// the whole tree.
pub trait Handle: Send {
    /// The file this handle reads.
    fn file(&self) -> &Path;

    /// Child keys of the node at `path` (`""` is the root). Leaves have no
    /// children.
    ///
    /// # Errors
    /// [`SheafError::PathNotFound`] when nothing lives at `path`.
    fn child_names(&self, path: &str) -> Result<Vec<String>>;

    fn has_path(&self, path: &str) -> bool;

    /// Materialise the value at `path`.
    fn read(&self, path: &str) -> Result<Value>;

    /// Materialise the whole tree.
    fn read_all(&self) -> Result<Node>;
}

/// A handle over a tree already in memory. Text protocols cannot be read
/// partially, so their handles parse the file once and answer from this.
pub struct MemoryHandle {
    file: PathBuf,
    root: Node,
}

impl MemoryHandle {
    pub fn new(file: impl Into<PathBuf>, root: Node) -> Self {
        Self {
            file: file.into(),
            root,
        }
    }

    fn not_found(&self, path: &str) -> SheafError {
        SheafError::PathNotFound {
            file: self.file.clone(),
            path: path.to_string(),
        }
    }
}

impl Handle for MemoryHandle {
    fn file(&self) -> &Path {
        &self.file
    }

    fn child_names(&self, path: &str) -> Result<Vec<String>> {
        if let Some(node) = self.root.get_node(path) {
            return Ok(node.child_names());
        }
        match self.root.get(path) {
            Some(Value::Leaf(_)) => Ok(Vec::new()),
            _ => Err(self.not_found(path)),
        }
    }

    fn has_path(&self, path: &str) -> bool {
        self.root.has_path(path)
    }

    fn read(&self, path: &str) -> Result<Value> {
        self.root.get(path).cloned().ok_or_else(|| self.not_found(path))
    }

    fn read_all(&self) -> Result<Node> {
        Ok(self.root.clone())
    }
}

/// A protocol implementation.
pub trait Backend: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Whether [`Backend::save`] honours [`SaveOptions`].
    fn supports_options(&self) -> bool {
        false
    }

    /// Write `node` to `path`. `options` is `None` for unoptioned saves.
    fn save(&self, node: &Node, path: &Path, options: Option<&SaveOptions>) -> Result<()>;

    /// Open `path` (known to exist) for reading.
    fn open(&self, path: &Path) -> Result<Box<dyn Handle>>;
}

#[derive(Clone)]
struct Slot {
    protocol: Protocol,
    available: bool,
    backend: Option<Arc<dyn Backend>>,
}

/// Protocol → backend table with per-protocol capability flags.
#[derive(Clone)]
pub struct Registry {
    slots: Vec<Slot>,
}

impl Registry {
    /// Backends compiled into this build.
    pub fn builtin() -> Self {
        let codecs = Arc::new(CompressionRegistry::builtin());
        let mut slots = vec![
            Slot {
                protocol: Protocol::Json,
                available: true,
                backend: Some(Arc::new(text::JsonBackend)),
            },
            Slot {
                protocol: Protocol::ConduitBin,
                available: true,
                backend: Some(Arc::new(cbin::CbinBackend::new(codecs))),
            },
        ];
        #[cfg(feature = "io-hdf5")]
        slots.push(Slot {
            protocol: Protocol::Hdf5,
            available: true,
            backend: Some(Arc::new(h5::Hdf5Backend)),
        });
        #[cfg(not(feature = "io-hdf5"))]
        slots.push(Slot {
            protocol: Protocol::Hdf5,
            available: false,
            backend: None,
        });
        #[cfg(feature = "io-yaml")]
        slots.push(Slot {
            protocol: Protocol::Yaml,
            available: true,
            backend: Some(Arc::new(text::YamlBackend)),
        });
        #[cfg(not(feature = "io-yaml"))]
        slots.push(Slot {
            protocol: Protocol::Yaml,
            available: false,
            backend: None,
        });
        Self { slots }
    }

    /// Install `backend` for its protocol, replacing any existing slot.
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        let protocol = backend.protocol();
        self.slots.retain(|s| s.protocol != protocol);
        self.slots.push(Slot {
            protocol,
            available: true,
            backend: Some(backend),
        });
    }

    pub fn is_available(&self, protocol: &Protocol) -> bool {
        self.slots
            .iter()
            .any(|s| &s.protocol == protocol && s.available && s.backend.is_some())
    }

    /// Known protocols with their availability, in registration order.
    pub fn protocols(&self) -> impl Iterator<Item = (&Protocol, bool)> {
        self.slots
            .iter()
            .map(|s| (&s.protocol, s.available && s.backend.is_some()))
    }

    pub fn lookup(&self, protocol: &Protocol) -> Result<Arc<dyn Backend>> {
        let unavailable = |reason| SheafError::ProtocolUnavailable {
            protocol: protocol.name().to_string(),
            reason,
        };
        if *protocol == Protocol::Npz {
            return Err(unavailable("npz archives hold column tables, not trees"));
        }
        let slot = self
            .slots
            .iter()
            .find(|s| &s.protocol == protocol)
            .ok_or_else(|| unavailable("unknown protocol"))?;
        match (&slot.backend, slot.available) {
            (Some(backend), true) => Ok(Arc::clone(backend)),
            _ => Err(unavailable("no backend in this build")),
        }
    }
}

/// Entry point for reading and writing trees.
#[derive(Clone, Default)]
pub struct Codec {
    registry: OnceLock<Registry>,
}

impl Codec {
    pub fn new() -> Self {
        Self::default()
    }

    /// A codec using `registry` instead of the built-in one.
    pub fn with_registry(registry: Registry) -> Self {
        let codec = Self::default();
        let _ = codec.registry.set(registry);
        codec
    }

    pub fn registry(&self) -> &Registry {
        self.registry.get_or_init(Registry::builtin)
    }

    /// Install a backend, replacing the one for its protocol.
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        self.registry();
        if let Some(registry) = self.registry.get_mut() {
            registry.register(backend);
        }
    }

    /// Save `node` to `path` with the protocol named by its extension.
    ///
    /// For protocols that take options, a backend without the option surface
    /// receives an unoptioned save; this is reported in the outcome and logged
    /// rather than failing.
    pub fn save(&self, node: &Node, path: impl AsRef<Path>, options: &SaveOptions) -> Result<SaveOutcome> {
        let path = path.as_ref();
        let protocol = determine_protocol(path)?;
        let backend = self.registry().lookup(&protocol)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent)
                .map_err(|e| SheafError::io(format!("mkdir -p {}", parent.display()), e))?;
        }

        let mut outcome = SaveOutcome {
            protocol: protocol.clone(),
            options_applied: false,
            options_skipped: false,
        };
        if protocol.accepts_options() && backend.supports_options() {
            backend.save(node, path, Some(options))?;
            outcome.options_applied = true;
        } else {
            if protocol.accepts_options() {
                tracing::warn!(
                    file = %path.display(),
                    %protocol,
                    "backend cannot take save options; saving without chunking or compression"
                );
                outcome.options_skipped = true;
            }
            backend.save(node, path, None)?;
        }
        tracing::debug!(file = %path.display(), %protocol, children = node.len(), "saved tree");
        Ok(outcome)
    }

    /// Open `path` without materialising any content.
    ///
    /// # Errors
    /// [`SheafError::FileNotFound`] when `path` does not exist, plus protocol
    /// and parse errors from the backend.
    pub fn load_handle(&self, path: impl AsRef<Path>) -> Result<Box<dyn Handle>> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SheafError::FileNotFound(path.to_path_buf()));
        }
        let protocol = determine_protocol(path)?;
        self.registry().lookup(&protocol)?.open(path)
    }

    /// Load the whole tree, a sub-tree, or just a handle.
    ///
    /// # Errors
    /// [`SheafError::PathNotFound`] when `at` names a path absent from the
    /// file (including the empty path), [`SheafError::FileNotFound`] when the
    /// file does not exist.
    pub fn load(&self, path: impl AsRef<Path>, at: NodePath<'_>) -> Result<Loaded> {
        let handle = self.load_handle(path)?;
        match at {
            NodePath::Handle => Ok(Loaded::Handle(handle)),
            NodePath::Root | NodePath::At("/") => Ok(Loaded::Value(Value::Node(handle.read_all()?))),
            NodePath::At(p) => {
                if segments(p).next().is_none() || !handle.has_path(p) {
                    return Err(SheafError::PathNotFound {
                        file: handle.file().to_path_buf(),
                        path: p.to_string(),
                    });
                }
                Ok(Loaded::Value(handle.read(p)?))
            }
        }
    }

    /// Load the whole tree at `path`.
    pub fn load_node(&self, path: impl AsRef<Path>) -> Result<Node> {
        let handle = self.load_handle(path)?;
        handle.read_all()
    }
}
