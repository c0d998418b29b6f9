//! Version control port.
//!
//! The reconciler never talks to git directly; it goes through
//! [`SourceControl`], which keeps the transport swappable and lets tests run
//! against an in-memory double.
//!
//! - [`GitBackend`] - libgit2 implementation used by the CLI

mod git;

pub use git::GitBackend;

use crate::specifier::RevisionHint;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("git {op} failed: {message}")]
pub struct VcsError {
    pub op: &'static str,
    pub message: String,
}

impl VcsError {
    pub fn new(op: &'static str, message: impl Into<String>) -> Self {
        Self {
            op,
            message: message.into(),
        }
    }
}

pub type VcsResult<T> = std::result::Result<T, VcsError>;

/// One commit in an update delta, for display only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub id: String,
    pub summary: String,
}

pub trait SourceControl {
    /// Depth-1 clone of `hint` (or the default branch) into `dest`, checked out.
    /// Returns the checked-out revision.
    fn clone_shallow(&self, url: &str, dest: &Path, hint: Option<&RevisionHint>)
    -> VcsResult<String>;

    /// Clone every branch and tag into `dest` without checking out a tree.
    fn clone_bare(&self, url: &str, dest: &Path) -> VcsResult<()>;

    /// Force the working tree at `dir` to `revision` (detached HEAD).
    fn checkout(&self, dir: &Path, revision: &str) -> VcsResult<()>;

    /// Fetch `hint` (or the default branch) from origin. Returns the remote tip
    /// without touching the working tree.
    fn fetch(&self, dir: &Path, hint: Option<&RevisionHint>) -> VcsResult<String>;

    fn current_revision(&self, dir: &Path) -> VcsResult<String>;

    /// Commits reachable from `to` but not from `from`, newest first.
    fn commits_between(&self, dir: &Path, from: &str, to: &str) -> VcsResult<Vec<CommitSummary>>;
}

pub fn short_hash(rev: &str) -> &str {
    rev.get(..7).unwrap_or(rev)
}
