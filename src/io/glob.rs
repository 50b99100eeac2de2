//! Resolving input file sets.
//!
//! # Examples
//!
//! ```no_run
//! use sheaf::io::glob::{chunk_candidates, expand_glob};
//!
//! // Every bundle a previous collect wrote.
//! let files = expand_glob("runs/*.cbin")?;
//!
//! // `out/bundle_000.cbin`, `out/bundle_001.cbin`, ... for `out/bundle.cbin`.
//! let chunks = chunk_candidates("out/bundle.cbin")?;
//! # use anyhow::Error; Ok::<(), Error>(())
//! ```

use anyhow::{Context, Result, bail};
use glob::{Pattern, glob};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Expand a glob pattern into a sorted vector of matching file paths.
/// Directories are skipped and zero matches is not an error.
///
/// # Errors
///
/// Returns an error if the pattern is invalid or a matched entry cannot be
/// read.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;

    let mut result = Vec::new();
    for entry in paths {
        let path = entry.with_context(|| format!("error reading glob entry for pattern: {pattern}"))?;
        if path.is_file() {
            result.push(path);
        }
    }
    result.sort();
    Ok(result)
}

/// Like [`expand_glob`], but zero matches is an error.
pub fn expand_glob_required(pattern: &str) -> Result<Vec<PathBuf>> {
    let files = expand_glob(pattern)?;
    if files.is_empty() {
        bail!("no files found matching pattern: {pattern}");
    }
    Ok(files)
}

fn has_magic(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Resolve command-line inputs: arguments with glob metacharacters are
/// expanded, others are taken literally (and may not exist). Duplicates are
/// dropped, keeping the first occurrence.
pub fn expand_inputs<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<PathBuf>> {
    let mut out: Vec<PathBuf> = Vec::new();
    for input in inputs {
        let input = input.as_ref();
        let found = if has_magic(input) {
            expand_glob(input)?
        } else {
            vec![PathBuf::from(input)]
        };
        for path in found {
            if !out.contains(&path) {
                out.push(path);
            }
        }
    }
    Ok(out)
}

static CHUNK_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_\d+").expect("static regex"));

/// Candidate chunk files for `input`: files matching `<stem>*.<ext>` in the
/// same directory, excluding `input` itself, sorted.
///
/// # Errors
///
/// Returns an error if `input` has no file stem or extension.
pub fn chunk_candidates(input: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let input = input.as_ref();
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("{} has no file name", input.display()))?;
    let ext = input
        .extension()
        .and_then(|s| s.to_str())
        .with_context(|| format!("{} needs an extension to find its chunks", input.display()))?;
    let dir = input.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let pattern = format!(
        "{}/{}*.{}",
        Pattern::escape(&dir.to_string_lossy()),
        Pattern::escape(stem),
        Pattern::escape(ext)
    );
    Ok(expand_glob(&pattern)?
        .into_iter()
        .filter(|p| p.file_name() != input.file_name())
        .collect())
}

/// The first `_<digits>` run in the file name of `path` (e.g. `_003` for
/// `bundle_003.cbin`).
pub fn chunk_id(path: impl AsRef<Path>) -> Option<String> {
    let name = path.as_ref().file_name()?.to_str()?;
    CHUNK_ID.find(name).map(|m| m.as_str().to_string())
}
