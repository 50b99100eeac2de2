//! Typed error kinds shared by the tree model, the protocol layer and the
//! pipelines.
//!
//! Pipeline entry points return [`anyhow::Result`] and attach context, but the
//! underlying [`SheafError`] stays reachable through `downcast_ref`, so callers
//! can branch on the kind (e.g. treat [`SheafError::OutputExists`] as a soft
//! failure).

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for the lower layers of the crate.
pub type Result<T, E = SheafError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SheafError {
    /// An input path does not exist.
    #[error("no such file: {}", .0.display())]
    FileNotFound(PathBuf),

    /// A requested sub-path is absent from a loaded tree.
    #[error("path '{path}' not found in {}", .file.display())]
    PathNotFound { file: PathBuf, path: String },

    /// The protocol cannot be determined from the file name.
    #[error("{} needs an extension (eg .cbin) to determine protocol", .0.display())]
    InvalidFormat(PathBuf),

    /// A value has no leaf representation.
    #[error("unsupported leaf type at '{key}': {kind}")]
    UnsupportedLeafType { key: String, kind: String },

    /// The target already exists and overwriting was not requested.
    #[error("{} already exists (pass force to re-create it)", .0.display())]
    OutputExists(PathBuf),

    /// No backend can serve the protocol.
    #[error("protocol '{protocol}' is unavailable: {reason}")]
    ProtocolUnavailable {
        protocol: String,
        reason: &'static str,
    },

    /// A bundle has no samples to derive a schema from.
    #[error("bundle {} has no samples", .0.display())]
    EmptyBundle(PathBuf),

    /// Arrays cannot be combined because their dimensionality differs.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// File content does not match the protocol.
    #[error("malformed {}: {reason}", .file.display())]
    Malformed { file: PathBuf, reason: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl SheafError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn malformed(file: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Malformed {
            file: file.into(),
            reason: reason.to_string(),
        }
    }
}
