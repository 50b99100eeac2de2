//! # Sheaf
//!
//! Aggregation and flattening of hierarchical sample records.
//!
//! Simulation campaigns and experiments usually leave behind one small tree of
//! named values per run. Sheaf merges those trees into bundles, then flattens a
//! bundle into uniform numeric columns (one array per leaf path, one row per
//! sample) for downstream analysis.
//!
//! ## Pipeline
//!
//! ```text
//! per-run files ──collect──▶ bundle(s) ──translate──▶ column archive(s) ──stack──▶ one archive
//! ```
//!
//! - [`collect`]: merge files into bundles, renaming colliding top-level names,
//!   optionally in chunks or one partition per worker.
//! - [`translate`]: project every sample onto a [`translate::Schema`] and
//!   stack the values into a [`columns::ColumnTable`], optionally one chunk
//!   per thread.
//! - [`stack`]: join column archives, NaN-padding ragged arrays.
//!
//! ## Data model
//!
//! [`tree::Node`] is an ordered mapping from keys to nodes or [`tree::Leaf`]
//! values (numeric scalars, strings, typed n-d arrays, null). [`tree::pack`]
//! builds trees from dynamic [`serde_json::Value`]s.
//!
//! ## Formats
//!
//! [`io::Codec`] picks the protocol from the file extension: `.json`,
//! `.yaml`/`.yml` (feature `io-yaml`), `.cbin` (raw binary plus a `_json`
//! layout side-car, with per-leaf compression) and `.npz` column archives
//! (feature `io-npz`). `.hdf5`/`.h5` needs the `io-hdf5` feature (and a system
//! libhdf5); without it those files report [`SheafError::ProtocolUnavailable`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use sheaf::collect::{CollectOptions, Collector};
//! use sheaf::io::Codec;
//! use sheaf::translate::{Schema, TranslateOptions, Translator};
//! # fn main() -> anyhow::Result<()> {
//! let codec = Codec::new();
//! let collector = Collector::new(codec.clone(), CollectOptions::default());
//! let report = collector.collect(&["runs/0.json", "runs/1.json"], "bundle.cbin")?;
//! assert!(report.is_success());
//!
//! let translator = Translator::new(codec, TranslateOptions::default());
//! translator.translate("bundle.cbin", "columns.npz", &Schema::Auto)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `io-yaml` - YAML trees via `serde_yaml`
//! - `io-npz` - column archives via `npyz`
//! - `parallel-io` - chunk translation on a rayon pool
//! - `compression-zstd`, `compression-gzip`, `compression-xz`, `compression-bzip2` -
//!   leaf compression codecs for `.cbin`
//!
//! All are enabled by default.

pub mod collect;
pub mod columns;
pub mod error;
pub mod io;
pub mod partition;
pub mod report;
pub mod serialize;
pub mod stack;
pub mod translate;
pub mod tree;

pub use collect::{CollectOptions, Collector};
pub use columns::{Column, ColumnTable};
pub use error::SheafError;
pub use io::{Codec, NodePath, SaveOptions};
pub use partition::WorkerRank;
pub use stack::Stacker;
pub use translate::{Schema, TranslateOptions, Translator};
pub use tree::{Leaf, Node, Value};
