//! Merging many per-sample files into bundles.
//!
//! Every input file holds one tree; its top-level children are copied into
//! the bundle under their own names. Within one output bundle a name that is
//! already taken is renamed to `<name>-<uuid>` (first seen wins, in input
//! order). Files that cannot be loaded are skipped and reported, never fatal.
//!
//! ```no_run
//! use sheaf::collect::{CollectOptions, Collector};
//! use sheaf::io::Codec;
//! # fn main() -> anyhow::Result<()> {
//! let collector = Collector::new(
//!     Codec::new(),
//!     CollectOptions { chunk_size: Some(100), ..Default::default() },
//! );
//! let report = collector.collect(&["runs/0.json", "runs/1.json"], "bundle.cbin")?;
//! // bundle_000.cbin
//! for out in report.outputs() {
//!     println!("{}", out.display());
//! }
//! # Ok(())
//! # }
//! ```

use crate::io::{Codec, SaveOptions, determine_protocol};
use crate::partition::{WorkerRank, read_partitions};
use crate::report::{CollectReport, GroupReport, Issue};
use crate::tree::{Node, Value};
use anyhow::{Context, Result, bail};
use std::fs::{File, create_dir_all};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Collector configuration.
#[derive(Clone, Debug, Default)]
pub struct CollectOptions {
    /// Files per output bundle. `None` (or 0) writes a single bundle.
    pub chunk_size: Option<usize>,
    /// Nest each file's tree under a fresh UUID instead of using its own
    /// top-level names.
    pub add_uuid: bool,
    pub save: SaveOptions,
}

pub struct Collector {
    codec: Codec,
    options: CollectOptions,
}

/// `base.ext` → `base_007.ext` for group 7.
pub fn chunk_path(outfile: impl AsRef<Path>, index: usize) -> PathBuf {
    let outfile = outfile.as_ref();
    let stem = outfile
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match outfile.extension() {
        Some(ext) => format!("{stem}_{index:03}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{index:03}"),
    };
    outfile.with_file_name(name)
}

impl Collector {
    pub fn new(codec: Codec, options: CollectOptions) -> Self {
        Self { codec, options }
    }

    pub fn options(&self) -> &CollectOptions {
        &self.options
    }

    /// Merge `paths` into one tree. Empty paths are skipped silently, files
    /// that fail to load are skipped and reported.
    pub fn merge_group<P: AsRef<Path>>(&self, paths: &[P]) -> (Node, GroupReport) {
        let mut merged = Node::new();
        let mut report = GroupReport::default();
        for path in paths {
            let path = path.as_ref();
            if path.as_os_str().is_empty() {
                continue;
            }
            let tree = match self.codec.load_node(path) {
                Ok(tree) => tree,
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "skipping unreadable input");
                    report.skipped.push(Issue::new(path.display().to_string(), &e));
                    continue;
                }
            };
            let children: Vec<(String, Value)> = if self.options.add_uuid {
                vec![(Uuid::new_v4().to_string(), Value::Node(tree))]
            } else {
                tree.into_iter().collect()
            };
            for (name, value) in children {
                let name = if merged.contains_key(&name) {
                    let renamed = format!("{name}-{}", Uuid::new_v4());
                    tracing::warn!(
                        file = %path.display(),
                        name = %name,
                        renamed = %renamed,
                        "name collision; renaming"
                    );
                    report.renamed.push((name, renamed.clone()));
                    renamed
                } else {
                    name
                };
                merged.insert(name, value);
            }
            tracing::debug!(file = %path.display(), children = merged.len(), "merged input");
            report.merged.push(path.to_path_buf());
        }
        report.children = merged.len();
        (merged, report)
    }

    fn save_group(&self, node: &Node, output: PathBuf, report: &mut GroupReport) {
        match self.codec.save(node, &output, &self.options.save) {
            Ok(outcome) => {
                report.record_save(&outcome);
                tracing::info!(
                    output = %output.display(),
                    merged = report.merged.len(),
                    skipped = report.skipped.len(),
                    children = report.children,
                    "wrote bundle"
                );
            }
            Err(e) => {
                tracing::error!(output = %output.display(), error = %e, "failed to save bundle");
                report.error = Some(e.to_string());
            }
        }
        report.output = output;
    }

    /// Merge `inputs` into `outfile`, or into `chunk_path(outfile, i)` for
    /// each group of `chunk_size` consecutive inputs.
    ///
    /// # Errors
    ///
    /// Fails up front when `outfile` names no protocol. Per-file and per-group
    /// failures are reported in the returned [`CollectReport`].
    pub fn collect<P: AsRef<Path>>(&self, inputs: &[P], outfile: impl AsRef<Path>) -> Result<CollectReport> {
        let outfile = outfile.as_ref();
        determine_protocol(outfile).with_context(|| format!("collect into {}", outfile.display()))?;

        let chunked = self.options.chunk_size.filter(|&k| k > 0);
        let groups: Vec<&[P]> = match chunked {
            Some(k) => inputs.chunks(k).collect(),
            None => vec![inputs],
        };
        tracing::info!(
            inputs = inputs.len(),
            groups = groups.len(),
            output = %outfile.display(),
            "collecting"
        );

        let mut report = CollectReport::default();
        for (i, group) in groups.into_iter().enumerate() {
            let output = match chunked {
                Some(_) => chunk_path(outfile, i),
                None => outfile.to_path_buf(),
            };
            let (node, mut group_report) = self.merge_group(group);
            self.save_group(&node, output, &mut group_report);
            report.groups.push(group_report);
        }
        Ok(report)
    }

    /// Merge this worker's share of a partition side file into
    /// `chunk_path(outfile, rank.index)`.
    ///
    /// # Errors
    ///
    /// Fails when the side file cannot be read or has no partition for
    /// `rank`.
    pub fn collect_partition(
        &self,
        partition_file: impl AsRef<Path>,
        outfile: impl AsRef<Path>,
        rank: WorkerRank,
    ) -> Result<GroupReport> {
        let partition_file = partition_file.as_ref();
        let outfile = outfile.as_ref();
        determine_protocol(outfile).with_context(|| format!("collect into {}", outfile.display()))?;
        let partitions = read_partitions(partition_file)?;
        if partitions.len() != rank.size {
            tracing::warn!(
                partitions = partitions.len(),
                world = rank.size,
                "partition count differs from worker count"
            );
        }
        let Some(mine) = partitions.get(rank.index) else {
            bail!(
                "rank {} has no partition: {} holds {}",
                rank.index,
                partition_file.display(),
                partitions.len()
            );
        };
        tracing::info!(rank = rank.index, files = mine.len(), "collecting partition");
        let (node, mut report) = self.merge_group(mine);
        self.save_group(&node, chunk_path(outfile, rank.index), &mut report);
        Ok(report)
    }
}

/// Concatenate JSON documents into one JSON list at `output`, in input
/// order. Documents are copied whole, booleans and all; nothing is packed.
/// Returns the number of documents written.
///
/// # Errors
///
/// Fails on the first input that cannot be read or parsed; `output` is only
/// written when every input parsed.
pub fn concat_json<P: AsRef<Path>>(inputs: &[P], output: impl AsRef<Path>) -> Result<usize> {
    let output = output.as_ref();
    let docs = inputs
        .iter()
        .map(|path| -> Result<serde_json::Value> {
            let path = path.as_ref();
            let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
            serde_json::from_reader(BufReader::new(file)).with_context(|| format!("parse {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    let file = File::create(output).with_context(|| format!("create {}", output.display()))?;
    let mut w = BufWriter::new(file);
    serde_json::to_writer(&mut w, &docs).with_context(|| format!("write {}", output.display()))?;
    w.flush().with_context(|| format!("write {}", output.display()))?;
    tracing::info!(documents = docs.len(), output = %output.display(), "wrote JSON list");
    Ok(docs.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_paths_insert_padded_index() {
        assert_eq!(chunk_path("out/bundle.cbin", 7), PathBuf::from("out/bundle_007.cbin"));
        assert_eq!(chunk_path("b.tar.json", 12), PathBuf::from("b.tar_012.json"));
        assert_eq!(chunk_path("plain", 0), PathBuf::from("plain_000"));
    }
}
