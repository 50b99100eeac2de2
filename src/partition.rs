//! Splitting input files across workers.
//!
//! A partition side file is a JSON array of arrays of paths, one inner array
//! per worker. [`group_files`] builds one; [`WorkerRank::from_env`] tells a
//! worker which inner array is its own.

use anyhow::{Context, Result, bail};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Split `paths` into exactly `n` contiguous groups whose sizes differ by at
/// most one; the first `len % n` groups take the extra file. Groups may be
/// empty when `n` exceeds the number of paths.
///
/// ```
/// use sheaf::partition::group_files;
///
/// let groups = group_files(&["a", "b", "c", "d", "e"], 2);
/// assert_eq!(groups, [vec!["a", "b", "c"], vec!["d", "e"]]);
/// ```
pub fn group_files<T: Clone>(paths: &[T], n: usize) -> Vec<Vec<T>> {
    let n = n.max(1);
    let base = paths.len() / n;
    let extra = paths.len() % n;
    let mut groups = Vec::with_capacity(n);
    let mut start = 0;
    for i in 0..n {
        let len = base + usize::from(i < extra);
        groups.push(paths[start..start + len].to_vec());
        start += len;
    }
    groups
}

pub fn write_partitions(path: impl AsRef<Path>, partitions: &[Vec<PathBuf>]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut w, partitions).with_context(|| format!("write {}", path.display()))?;
    w.flush().with_context(|| format!("flush {}", path.display()))?;
    Ok(())
}

pub fn read_partitions(path: impl AsRef<Path>) -> Result<Vec<Vec<PathBuf>>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("{} is not a JSON list of path lists", path.display()))
}

/// This process's index among `size` cooperating workers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerRank {
    pub index: usize,
    pub size: usize,
}

impl Default for WorkerRank {
    fn default() -> Self {
        Self { index: 0, size: 1 }
    }
}

/// Launcher variables checked in order: our own, Open MPI, PMI (MPICH, Intel
/// MPI), Slurm.
const RANK_VARS: &[(&str, &str)] = &[
    ("SHEAF_RANK", "SHEAF_WORLD_SIZE"),
    ("OMPI_COMM_WORLD_RANK", "OMPI_COMM_WORLD_SIZE"),
    ("PMI_RANK", "PMI_SIZE"),
    ("SLURM_PROCID", "SLURM_NTASKS"),
];

impl WorkerRank {
    pub fn new(index: usize, size: usize) -> Result<Self> {
        if size == 0 || index >= size {
            bail!("rank {index} is outside a world of size {size}");
        }
        Ok(Self { index, size })
    }

    /// Read the rank from the first launcher whose variables are set; a lone
    /// process is rank 0 of 1.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        for (rank_var, size_var) in RANK_VARS {
            let Some(rank) = lookup(rank_var) else {
                continue;
            };
            let index: usize = rank
                .trim()
                .parse()
                .with_context(|| format!("{rank_var}={rank} is not a rank"))?;
            let size = match lookup(size_var) {
                Some(s) => s
                    .trim()
                    .parse()
                    .with_context(|| format!("{size_var}={s} is not a world size"))?,
                None => index + 1,
            };
            tracing::debug!(rank = index, size, source = rank_var, "worker rank from environment");
            return Self::new(index, size);
        }
        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn groups_are_balanced_and_contiguous() {
        let files: Vec<u32> = (0..10).collect();
        let groups = group_files(&files, 3);
        let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
        assert_eq!(sizes, [4, 3, 3]);
        assert_eq!(groups.concat(), files);
        assert_eq!(group_files(&files[..1], 3).iter().filter(|g| g.is_empty()).count(), 2);
    }

    #[test]
    fn rank_prefers_first_launcher_found() {
        let env: HashMap<&str, &str> = [("PMI_RANK", "2"), ("PMI_SIZE", "4"), ("SLURM_PROCID", "0")].into();
        let rank = WorkerRank::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(rank, WorkerRank { index: 2, size: 4 });
    }

    #[test]
    fn rank_defaults_to_single_process() {
        assert_eq!(WorkerRank::from_lookup(|_| None).unwrap(), WorkerRank::default());
    }

    #[test]
    fn rank_outside_world_is_rejected() {
        let env: HashMap<&str, &str> = [("SHEAF_RANK", "3"), ("SHEAF_WORLD_SIZE", "2")].into();
        assert!(WorkerRank::from_lookup(|k| env.get(k).map(|v| v.to_string())).is_err());
    }
}
