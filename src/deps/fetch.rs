//! Source fetching.
//!
//! Turns a [`SourceDescriptor`] into a working copy under `deps/<name>`.
//!
//! ## Acquisition modes
//!
//! - **Pin-exact**: full clone without checkout, then check out the pinned commit
//! - **Ref-acquire**: depth-1 fetch of a tag/branch (or the default branch)
//! - **Local-link**: symlink to a directory on disk
//!
//! Remote clones are staged in `deps/.<name>.partial` and only renamed into
//! place once checked out, so an interrupted fetch never leaves something that
//! looks installed. The fetcher never touches the lockfile.

use crate::config::Project;
use crate::error::{Error, Result};
use crate::lock::Pin;
use crate::specifier::SourceDescriptor;
use crate::vcs::{CommitSummary, SourceControl, VcsError, short_hash};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What is on disk for one dependency, computed once per operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallState {
    NotInstalled,
    Installed(Pin),
    /// Something is there but it is not a usable working copy
    /// (interrupted clone, dangling or foreign link, ...).
    Corrupt,
}

impl InstallState {
    pub fn label(&self) -> &'static str {
        match self {
            InstallState::NotInstalled => "missing",
            InstallState::Installed(_) => "installed",
            InstallState::Corrupt => "corrupt",
        }
    }
}

pub struct Fetcher<'a> {
    project: &'a Project,
    vcs: &'a dyn SourceControl,
}

fn fetch_failed(name: &str) -> impl Fn(VcsError) -> Error + '_ {
    move |e| Error::FetchFailed {
        name: name.to_string(),
        cause: e.to_string(),
    }
}

fn io_failed(name: &str) -> impl Fn(io::Error) -> Error + '_ {
    move |e| Error::FetchFailed {
        name: name.to_string(),
        cause: e.to_string(),
    }
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⣾⣽⣻⢿⡿⣟⣯⣷ "),
    );
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

/// Remove a file, directory tree, or symlink (without following it).
fn remove_path(path: &Path) -> io::Result<bool> {
    let meta = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if meta.file_type().is_symlink() {
        // Directory symlinks on Windows are removed as directories.
        fs::remove_file(path).or_else(|_| fs::remove_dir(path))?;
    } else if meta.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(true)
}

impl<'a> Fetcher<'a> {
    pub fn new(project: &'a Project, vcs: &'a dyn SourceControl) -> Self {
        Self { project, vcs }
    }

    fn staging_dir(&self, name: &str) -> PathBuf {
        self.project.deps_dir().join(format!(".{}.partial", name))
    }

    pub fn install_state(&self, name: &str, source: &SourceDescriptor) -> InstallState {
        let dest = self.project.working_copy(name);
        let Ok(meta) = fs::symlink_metadata(&dest) else {
            return InstallState::NotInstalled;
        };

        if source.is_local() {
            let expected = self.project.resolve_local(source.origin());
            let linked = meta.file_type().is_symlink()
                && fs::read_link(&dest).is_ok_and(|target| target == expected)
                && dest.is_dir();
            return if linked {
                InstallState::Installed(Pin::Local)
            } else {
                InstallState::Corrupt
            };
        }

        if meta.file_type().is_symlink() || !meta.is_dir() {
            return InstallState::Corrupt;
        }
        match self.vcs.current_revision(&dest) {
            Ok(rev) => InstallState::Installed(Pin::Commit(rev)),
            Err(e) => {
                debug!("{} has no readable revision: {}", dest.display(), e);
                InstallState::Corrupt
            }
        }
    }

    /// Run `acquire` against a fresh staging directory and move the result to
    /// `deps/<name>` only if it succeeds.
    fn staged<T>(&self, name: &str, acquire: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
        let staging = self.staging_dir(name);
        remove_path(&staging).map_err(io_failed(name))?;
        fs::create_dir_all(self.project.deps_dir()).map_err(io_failed(name))?;

        let value = match acquire(&staging) {
            Ok(v) => v,
            Err(e) => {
                let _ = remove_path(&staging);
                return Err(e);
            }
        };

        let dest = self.project.working_copy(name);
        remove_path(&dest).map_err(io_failed(name))?;
        fs::rename(&staging, &dest).map_err(io_failed(name))?;
        Ok(value)
    }

    /// Pin-exact: materialize exactly `revision`.
    pub fn pin_exact(&self, name: &str, source: &SourceDescriptor, revision: &str) -> Result<()> {
        let pb = spinner(format!("Fetching {} @ {}...", name, short_hash(revision)));
        let result = self.staged(name, |dir| {
            self.vcs
                .clone_bare(source.origin(), dir)
                .and_then(|_| self.vcs.checkout(dir, revision))
                .map_err(fetch_failed(name))
        });
        match &result {
            Ok(()) => pb.finish_with_message(format!(
                "{} Fetched {} (locked {})",
                "✓".green(),
                name,
                short_hash(revision)
            )),
            Err(_) => pb.finish_with_message(format!("{} Failed {}", "x".red(), name)),
        }
        result
    }

    /// Ref-acquire: check out the hinted ref (or default branch) and return
    /// the revision it resolved to.
    pub fn acquire(&self, name: &str, source: &SourceDescriptor) -> Result<String> {
        let target = source
            .revision_hint()
            .map_or_else(|| "default branch".to_string(), |h| h.to_string());
        let pb = spinner(format!("Downloading {} ({})...", name, target));
        let result = self.staged(name, |dir| {
            self.vcs
                .clone_shallow(source.origin(), dir, source.revision_hint())
                .map_err(fetch_failed(name))
        });
        match &result {
            Ok(rev) => pb.finish_with_message(format!(
                "{} Downloaded {} ({} → {})",
                "✓".green(),
                name,
                target,
                short_hash(rev)
            )),
            Err(_) => pb.finish_with_message(format!("{} Failed {}", "x".red(), name)),
        }
        result
    }

    /// Local-link: point `deps/<name>` at the declared directory.
    pub fn link_local(&self, name: &str, source: &SourceDescriptor) -> Result<()> {
        let target = self.project.resolve_local(source.origin());
        if !target.is_dir() {
            return Err(Error::FetchFailed {
                name: name.to_string(),
                cause: format!("local path {} is not a directory", target.display()),
            });
        }

        let dest = self.project.working_copy(name);
        fs::create_dir_all(self.project.deps_dir()).map_err(io_failed(name))?;
        remove_path(&dest).map_err(io_failed(name))?;
        symlink_dir(&target, &dest).map_err(io_failed(name))?;
        println!("   {} Linked {} → {}", "🔗".blue(), name, target.display());
        Ok(())
    }

    /// Fetch the current tip of the followed ref without touching the tree.
    pub fn refresh(&self, name: &str, source: &SourceDescriptor) -> Result<String> {
        let dir = self.project.working_copy(name);
        self.vcs
            .fetch(&dir, source.revision_hint())
            .map_err(fetch_failed(name))
    }

    pub fn checkout(&self, name: &str, revision: &str) -> Result<()> {
        let dir = self.project.working_copy(name);
        self.vcs
            .checkout(&dir, revision)
            .map_err(fetch_failed(name))?;
        println!("   {} Locked to {}", "📌".blue(), short_hash(revision));
        Ok(())
    }

    pub fn commits_between(&self, name: &str, from: &str, to: &str) -> Result<Vec<CommitSummary>> {
        let dir = self.project.working_copy(name);
        self.vcs
            .commits_between(&dir, from, to)
            .map_err(fetch_failed(name))
    }

    pub fn remove_working_copy(&self, name: &str) -> Result<bool> {
        let _ = remove_path(&self.staging_dir(name));
        Ok(remove_path(&self.project.working_copy(name))?)
    }
}
