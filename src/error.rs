//! Error types shared by every dependency operation.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed package reference.
    #[error(
        "invalid package specifier '{0}' (expected owner/repo[@tag|#branch], github:owner/repo, git:<url> or path:<dir>)"
    )]
    InvalidSpecifier(String),

    /// Transport or checkout failure while materializing a dependency.
    #[error("failed to fetch '{name}': {cause}")]
    FetchFailed { name: String, cause: String },

    /// Frozen install found a declared dependency without a usable lock entry.
    #[error("'{name}' is not pinned in vend.lock (run 'vend install' without --frozen)")]
    LockfileIncomplete { name: String },

    #[error("package '{name}' is not installed")]
    PackageNotInstalled { name: String },

    #[error("package '{name}' is already declared")]
    PackageAlreadyExists { name: String },

    #[error("vend.json not found in {}", .0.display())]
    ManifestNotFound(PathBuf),

    #[error("invalid manifest {}: {reason}", path.display())]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("unsupported lockfile version {0} (this vend understands version 1)")]
    UnsupportedLockfileVersion(u32),

    /// A batch operation committed what it could but some packages failed.
    #[error("{} of {total} dependencies failed: {}", failed.len(), failed.join(", "))]
    BatchFailed { failed: Vec<String>, total: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
