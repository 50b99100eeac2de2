//! Flattening bundles into column tables.
//!
//! A bundle is a tree whose top-level children are samples. Translation
//! resolves a [`Schema`] into an ordered list of leaf paths (relative to one
//! sample), reads every path from every sample, and stacks the values into one
//! column per path with one row per sample. A path a sample lacks, or that
//! holds a string, null, or node, becomes a NaN row; the column's row count
//! always equals the sample count.
//!
//! ```no_run
//! use sheaf::io::Codec;
//! use sheaf::translate::{Schema, TranslateOptions, Translator};
//! # fn main() -> anyhow::Result<()> {
//! let translator = Translator::new(Codec::new(), TranslateOptions::default());
//! let report = translator.translate("bundle.cbin", "columns.npz", &Schema::parse("inputs,outputs/y"))?;
//! println!("{} samples, {} missing values", report.samples, report.missing_count());
//! # Ok(())
//! # }
//! ```

use crate::columns::{Column, ColumnTable, stack_jagged};
use crate::error::SheafError;
use crate::io::glob::{chunk_candidates, chunk_id};
use crate::io::npz::save_npz;
use crate::io::{Codec, Handle, Protocol, SaveOptions, determine_protocol};
use crate::report::{ChunkOutcome, ChunkedReport, Issue, TranslateReport};
use crate::tree::{Node, Value, join_path, pack_columns, segments};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Which leaf paths of a sample become columns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Schema {
    /// Every leaf of the first sample.
    Auto,
    /// Leaves at or below each listed path of the first sample.
    Paths(Vec<String>),
    /// Every leaf of the tree stored in a schema file.
    File(PathBuf),
}

impl Schema {
    /// `"auto"`, a comma-separated path list, or a schema file path. A single
    /// path needs a trailing comma (`"inputs,"`) to be read as a list.
    pub fn parse(arg: &str) -> Schema {
        let arg = arg.trim();
        if arg == "auto" {
            Schema::Auto
        } else if arg.contains(',') {
            Schema::Paths(
                arg.split(',')
                    .map(|p| segments(p).collect::<Vec<_>>().join("/"))
                    .filter(|p| !p.is_empty())
                    .collect(),
            )
        } else {
            Schema::File(PathBuf::from(arg))
        }
    }
}

/// Translator configuration.
#[derive(Clone, Debug, Default)]
pub struct TranslateOptions {
    /// Options for tree outputs; column archives ignore them.
    pub save: SaveOptions,
}

pub struct Translator {
    codec: Codec,
    options: TranslateOptions,
}

impl Translator {
    pub fn new(codec: Codec, options: TranslateOptions) -> Self {
        Self { codec, options }
    }

    /// Resolve `schema` against the first sample into ordered leaf paths.
    /// Returns the paths plus the listed entries that matched nothing.
    fn resolve(&self, schema: &Schema, first: &Node) -> Result<(Vec<String>, Vec<String>)> {
        let leaves = |node: &Node| node.walk().map(|(p, _)| p).collect::<Vec<_>>();
        Ok(match schema {
            Schema::Auto => (leaves(first), Vec::new()),
            Schema::Paths(prefixes) => {
                let mut paths = Vec::new();
                let mut unmatched = Vec::new();
                for prefix in prefixes {
                    match first.get(prefix) {
                        Some(Value::Leaf(_)) => paths.push(prefix.clone()),
                        Some(Value::Node(n)) => {
                            paths.extend(n.walk().map(|(p, _)| join_path(prefix, &p)));
                        }
                        None => {
                            tracing::warn!(path = %prefix, "schema path not in first sample; skipping");
                            unmatched.push(prefix.clone());
                        }
                    }
                }
                (paths, unmatched)
            }
            Schema::File(file) => {
                let tree = self
                    .codec
                    .load_node(file)
                    .with_context(|| format!("read schema {}", file.display()))?;
                (leaves(&tree), Vec::new())
            }
        })
    }

    fn flatten(&self, input: &Path, schema: &Schema) -> Result<(ColumnTable, TranslateReport)> {
        let handle: Box<dyn Handle> = self
            .codec
            .load_handle(input)
            .with_context(|| format!("open bundle {}", input.display()))?;
        let samples = handle.child_names("")?;
        let Some(first_name) = samples.first() else {
            return Err(SheafError::EmptyBundle(input.to_path_buf()).into());
        };

        let first = match handle.read(first_name)? {
            Value::Node(n) => n,
            Value::Leaf(_) => {
                tracing::warn!(sample = %first_name, "first sample is a bare leaf; no paths to translate");
                Node::new()
            }
        };
        let (paths, unmatched) = self.resolve(schema, &first)?;
        drop(first);
        tracing::info!(
            bundle = %input.display(),
            samples = samples.len(),
            columns = paths.len(),
            "translating"
        );

        let mut report = TranslateReport {
            input: input.to_path_buf(),
            samples: samples.len(),
            unmatched,
            ..Default::default()
        };
        let mut rows: Vec<Vec<Column>> = vec![Vec::with_capacity(samples.len()); paths.len()];
        for sample in &samples {
            let tree = match handle.read(sample)? {
                Value::Node(n) => n,
                Value::Leaf(_) => Node::new(),
            };
            for (path, column) in paths.iter().zip(rows.iter_mut()) {
                let values = match tree.get(path) {
                    Some(Value::Leaf(leaf)) => leaf.to_f64_vec().ok_or("not numeric"),
                    Some(Value::Node(_)) => Err("not a leaf"),
                    None => Err("absent"),
                };
                let row = match values {
                    Ok(values) => Column::row(values),
                    Err(reason) => {
                        let item = join_path(sample, path);
                        tracing::debug!(path = %item, reason, "filling with NaN");
                        report.missing.push(Issue::new(item, reason));
                        Column::missing()
                    }
                };
                column.push(row);
            }
        }
        if !report.missing.is_empty() {
            tracing::warn!(count = report.missing.len(), "values missing from samples were filled with NaN");
        }

        let mut table = ColumnTable::new();
        for (path, column) in paths.into_iter().zip(rows) {
            let stacked = stack_jagged(&column).with_context(|| format!("stack column {path}"))?;
            report.columns.push(path.clone());
            table.insert(path, stacked);
        }
        Ok((table, report))
    }

    /// Flatten the bundle at `input` in memory.
    ///
    /// # Errors
    ///
    /// Fails when the bundle cannot be opened, holds no samples, or the schema
    /// file cannot be read.
    pub fn translate_table(&self, input: impl AsRef<Path>, schema: &Schema) -> Result<ColumnTable> {
        self.flatten(input.as_ref(), schema).map(|(table, _)| table)
    }

    /// Flatten the bundle at `input` and write the columns to `output`: an
    /// archive for `.npz`, otherwise a tree holding each column in the array
    /// layout.
    ///
    /// JSON cannot spell NaN: in a `.json` output every NaN fill is written as
    /// `null`, and a column holding one reads back as a node of its elements
    /// rather than an array leaf. Use `.npz`, `.cbin`, `.hdf5` or `.yaml` to
    /// keep the fills.
    pub fn translate(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        schema: &Schema,
    ) -> Result<TranslateReport> {
        let input = input.as_ref();
        let output = output.as_ref();
        let protocol = determine_protocol(output).with_context(|| format!("translate into {}", output.display()))?;
        let (table, mut report) = self.flatten(input, schema)?;
        if protocol == Protocol::Npz {
            save_npz(&table, output)?;
        } else {
            self.codec.save(&pack_columns(&table), output, &self.options.save)?;
        }
        tracing::info!(output = %output.display(), columns = table.len(), "wrote columns");
        report.output = output.to_path_buf();
        Ok(report)
    }

    fn translate_chunk(&self, chunk: &Path, base: &str, ext: &str, schema: &Schema) -> ChunkOutcome {
        let Some(id) = chunk_id(chunk) else {
            return ChunkOutcome {
                input: chunk.to_path_buf(),
                output: None,
                report: None,
                error: Some("no _<number> chunk id in file name".to_string()),
            };
        };
        let output = PathBuf::from(format!("{base}{id}{ext}"));
        match self.translate(chunk, &output, schema) {
            Ok(report) => ChunkOutcome {
                input: chunk.to_path_buf(),
                output: Some(output),
                report: Some(report),
                error: None,
            },
            Err(e) => {
                tracing::error!(chunk = %chunk.display(), error = %format!("{e:#}"), "chunk failed");
                ChunkOutcome {
                    input: chunk.to_path_buf(),
                    output: Some(output),
                    report: None,
                    error: Some(format!("{e:#}")),
                }
            }
        }
    }

    /// Translate every chunk file next to `input` (`<stem>*.<ext>`) into
    /// `<out_stem><id>.<out_ext>`, where `<id>` is the chunk's `_<number>`
    /// infix. Chunks run on a pool of `workers` threads (default: one per
    /// CPU); each chunk's result is returned, failures included.
    ///
    /// # Errors
    ///
    /// Fails only when the chunk set cannot be listed or the pool cannot be
    /// built.
    pub fn translate_chunks(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        schema: &Schema,
        workers: Option<usize>,
    ) -> Result<ChunkedReport> {
        let input = input.as_ref();
        let output = output.as_ref();
        let chunks = chunk_candidates(input)?;
        if chunks.is_empty() {
            tracing::warn!(input = %input.display(), "no chunk files found");
        }
        let (base, ext) = split_extension(output);

        #[cfg(feature = "parallel-io")]
        let chunks = {
            use rayon::prelude::*;
            let threads = workers.filter(|&n| n > 0).unwrap_or_else(num_cpus::get);
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .context("build translation pool")?;
            tracing::info!(chunks = chunks.len(), threads, "translating chunks");
            pool.install(|| {
                chunks
                    .par_iter()
                    .map(|c| self.translate_chunk(c, &base, &ext, schema))
                    .collect::<Vec<_>>()
            })
        };
        #[cfg(not(feature = "parallel-io"))]
        let chunks = {
            let _ = workers;
            chunks
                .iter()
                .map(|c| self.translate_chunk(c, &base, &ext, schema))
                .collect::<Vec<_>>()
        };

        let report = ChunkedReport { chunks };
        let failed = report.failures().count();
        if failed > 0 {
            tracing::warn!(failed, total = report.chunks.len(), "some chunks failed");
        }
        Ok(report)
    }
}

/// `dir/name.ext` → (`"dir/name"`, `".ext"`); no extension gives `""`.
fn split_extension(path: &Path) -> (String, String) {
    match path.extension() {
        Some(ext) => (
            path.with_extension("").to_string_lossy().into_owned(),
            format!(".{}", ext.to_string_lossy()),
        ),
        None => (path.to_string_lossy().into_owned(), String::new()),
    }
}
