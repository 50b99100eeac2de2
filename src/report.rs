//! Structured run reports.
//!
//! Every pipeline run returns a report listing what it produced and what it
//! skipped. Reports serialize to JSON for the command-line tool.

use crate::io::SaveOutcome;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// One skipped or failed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    /// File, key, or path the issue is about.
    pub item: String,
    pub reason: String,
}

impl Issue {
    pub fn new(item: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            item: item.into(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.item, self.reason)
    }
}

/// Outcome of merging and saving one group of input files.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupReport {
    pub output: PathBuf,
    /// Input files merged into the output.
    pub merged: Vec<PathBuf>,
    /// Input files that could not be loaded.
    pub skipped: Vec<Issue>,
    /// Top-level names that collided, with the name they were saved under.
    pub renamed: Vec<(String, String)>,
    /// Number of top-level children in the saved tree.
    pub children: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options_skipped: Option<bool>,
    /// Why the group could not be saved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GroupReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub(crate) fn record_save(&mut self, outcome: &SaveOutcome) {
        self.options_skipped = Some(outcome.options_skipped);
    }
}

/// Outcome of [`crate::collect::Collector::collect`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectReport {
    pub groups: Vec<GroupReport>,
}

impl CollectReport {
    pub fn is_success(&self) -> bool {
        self.groups.iter().all(GroupReport::is_success)
    }

    pub fn skipped_count(&self) -> usize {
        self.groups.iter().map(|g| g.skipped.len()).sum()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &PathBuf> {
        self.groups.iter().filter(|g| g.is_success()).map(|g| &g.output)
    }
}

/// Outcome of translating one bundle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TranslateReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub samples: usize,
    /// Column paths written, in output order.
    pub columns: Vec<String>,
    /// Sample/path pairs that had no numeric value and were filled with NaN.
    pub missing: Vec<Issue>,
    /// Schema entries that matched nothing in the first sample.
    pub unmatched: Vec<String>,
}

impl TranslateReport {
    pub fn missing_count(&self) -> usize {
        self.missing.len()
    }
}

/// Result of one chunk in a parallel translation.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkOutcome {
    pub input: PathBuf,
    /// Output path, absent when the chunk id could not be determined.
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<TranslateReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChunkOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of [`crate::translate::Translator::translate_chunks`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChunkedReport {
    pub chunks: Vec<ChunkOutcome>,
}

impl ChunkedReport {
    pub fn is_success(&self) -> bool {
        self.chunks.iter().all(ChunkOutcome::is_success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ChunkOutcome> {
        self.chunks.iter().filter(|c| !c.is_success())
    }
}

/// Outcome of [`crate::stack::Stacker::run`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct StackReport {
    pub target: PathBuf,
    pub sources: usize,
    /// The single source was copied byte for byte.
    pub copied: bool,
    /// Keys stacked into the target.
    pub stacked: Vec<String>,
    /// Keys omitted from the target.
    pub failed: Vec<Issue>,
    /// Keys present in later archives but not in the first.
    pub ignored: Vec<String>,
}

impl StackReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}
