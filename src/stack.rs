//! Merging column archives.
//!
//! Chunked translation leaves one archive per chunk; [`Stacker::run`] joins
//! them into one, stacking each key's arrays along the first axis with NaN
//! padding on the others (see [`crate::columns::stack_jagged`]).

use crate::columns::{Column, ColumnTable, stack_jagged};
use crate::error::SheafError;
use crate::io::npz::{load_npz, save_npz};
use crate::report::{Issue, StackReport};
use anyhow::{Context, Result, bail};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Stacker configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct Stacker {
    /// Overwrite an existing target.
    pub force: bool,
}

impl Stacker {
    pub fn new(force: bool) -> Self {
        Self { force }
    }

    /// Stack `sources` into `target`.
    ///
    /// The key set comes from the first source. A key missing from a later
    /// source, or whose arrays cannot be stacked, is left out of the target and
    /// reported; keys only later sources have are ignored.
    ///
    /// # Errors
    ///
    /// [`SheafError::OutputExists`] when `target` exists and `force` is off
    /// (nothing is written); an error when `sources` is empty or a source
    /// cannot be read.
    pub fn run<P: AsRef<Path>>(&self, target: impl AsRef<Path>, sources: &[P]) -> Result<StackReport> {
        let target = target.as_ref();
        tracing::info!(target = %target.display(), sources = sources.len(), "stacking");
        if !self.force && target.is_file() {
            return Err(SheafError::OutputExists(target.to_path_buf()).into());
        }
        let mut report = StackReport {
            target: target.to_path_buf(),
            sources: sources.len(),
            ..Default::default()
        };
        match sources {
            [] => bail!("no source archives to stack into {}", target.display()),
            [only] => {
                let only = only.as_ref();
                tracing::info!(source = %only.display(), "single source; copying instead of stacking");
                fs::copy(only, target).with_context(|| format!("copy {} to {}", only.display(), target.display()))?;
                report.copied = true;
                return Ok(report);
            }
            _ => {}
        }

        let mut keys: Vec<String> = Vec::new();
        let mut pending: Vec<Vec<Column>> = Vec::new();
        let mut failed: HashSet<String> = HashSet::new();
        let mut ignored: Vec<String> = Vec::new();
        for (i, source) in sources.iter().enumerate() {
            let source = source.as_ref();
            tracing::debug!(index = i, source = %source.display(), "loading source");
            let mut table = load_npz(source).with_context(|| format!("load {}", source.display()))?;
            if i == 0 {
                for (key, column) in table {
                    keys.push(key);
                    pending.push(vec![column]);
                }
                continue;
            }
            for (key, arrays) in keys.iter().zip(pending.iter_mut()) {
                match table.remove(key) {
                    Some(column) => arrays.push(column),
                    None => {
                        if failed.insert(key.clone()) {
                            tracing::warn!(key = %key, source = %source.display(), "key missing from source");
                            report.failed.push(Issue::new(key.clone(), format!("missing from {}", source.display())));
                        }
                    }
                }
            }
            for extra in table.keys() {
                if !ignored.iter().any(|k| k == extra) {
                    tracing::warn!(key = extra, source = %source.display(), "key not in first source; ignoring");
                    ignored.push(extra.to_string());
                }
            }
        }

        let mut out = ColumnTable::new();
        for (key, arrays) in keys.into_iter().zip(pending) {
            if failed.contains(&key) {
                continue;
            }
            match stack_jagged(&arrays) {
                Ok(stacked) => {
                    report.stacked.push(key.clone());
                    out.insert(key, stacked);
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "error stacking key");
                    report.failed.push(Issue::new(key, &e));
                }
            }
        }
        report.ignored = ignored;
        save_npz(&out, target).with_context(|| format!("write {}", target.display()))?;
        tracing::info!(target = %target.display(), keys = out.len(), failed = report.failed.len(), "stacked");
        Ok(report)
    }
}
