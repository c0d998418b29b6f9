//! libgit2-backed [`SourceControl`].

use super::{CommitSummary, SourceControl, VcsError, VcsResult};
use crate::specifier::RevisionHint;
use git2::{AutotagOption, FetchOptions, Oid, Repository, Sort};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
pub struct GitBackend;

impl GitBackend {
    pub fn new() -> Self {
        Self
    }
}

fn err(op: &'static str) -> impl Fn(git2::Error) -> VcsError {
    move |e| VcsError::new(op, e.message().to_string())
}

/// Refspec fetched for a hint, and the local ref it lands in.
/// The default branch has no local ref; it is read back from FETCH_HEAD.
fn refspec_for(hint: Option<&RevisionHint>) -> (String, Option<String>) {
    match hint {
        Some(RevisionHint::Tag(tag)) => {
            let local = format!("refs/tags/{}", tag);
            (format!("+refs/tags/{0}:{0}", tag), Some(local))
        }
        Some(RevisionHint::Branch(branch)) => {
            let local = format!("refs/remotes/origin/{}", branch);
            (format!("+refs/heads/{}:{}", branch, local), Some(local))
        }
        None => ("HEAD".to_string(), None),
    }
}

fn fetched_commit(repo: &Repository, local_ref: Option<&str>) -> VcsResult<Oid> {
    if let Some(name) = local_ref {
        let commit = repo
            .find_reference(name)
            .and_then(|r| r.peel_to_commit())
            .map_err(err("rev-parse"))?;
        return Ok(commit.id());
    }

    let mut first = None;
    repo.fetchhead_foreach(|_, _, oid, _| {
        if first.is_none() {
            first = Some(*oid);
        }
        true
    })
    .map_err(err("rev-parse"))?;

    let oid = first.ok_or_else(|| VcsError::new("rev-parse", "FETCH_HEAD is empty"))?;
    let commit = repo
        .find_object(oid, None)
        .and_then(|o| o.peel_to_commit())
        .map_err(err("rev-parse"))?;
    Ok(commit.id())
}

/// libgit2's local transport cannot negotiate shallow fetches.
fn supports_shallow(url: &str) -> bool {
    !url.starts_with("file://") && !Path::new(url).exists()
}

fn checkout_detached(repo: &Repository, oid: Oid) -> VcsResult<()> {
    let obj = repo.find_object(oid, None).map_err(err("checkout"))?;
    let mut checkout_opts = git2::build::CheckoutBuilder::new();
    checkout_opts.force();
    repo.checkout_tree(&obj, Some(&mut checkout_opts))
        .map_err(err("checkout"))?;
    repo.set_head_detached(oid).map_err(err("checkout"))?;
    Ok(())
}

impl SourceControl for GitBackend {
    fn clone_shallow(
        &self,
        url: &str,
        dest: &Path,
        hint: Option<&RevisionHint>,
    ) -> VcsResult<String> {
        debug!("shallow clone {} into {}", url, dest.display());
        let repo = Repository::init(dest).map_err(err("init"))?;
        let mut remote = repo.remote("origin", url).map_err(err("remote"))?;

        let (refspec, local_ref) = refspec_for(hint);
        let mut opts = FetchOptions::new();
        if supports_shallow(url) {
            opts.depth(1);
        }
        opts.download_tags(AutotagOption::None);
        remote
            .fetch(&[refspec.as_str()], Some(&mut opts), None)
            .map_err(err("fetch"))?;

        let oid = fetched_commit(&repo, local_ref.as_deref())?;
        checkout_detached(&repo, oid)?;
        Ok(oid.to_string())
    }

    fn clone_bare(&self, url: &str, dest: &Path) -> VcsResult<()> {
        debug!("full clone (no checkout) {} into {}", url, dest.display());
        let repo = Repository::init(dest).map_err(err("init"))?;
        let mut remote = repo.remote("origin", url).map_err(err("remote"))?;

        let mut opts = FetchOptions::new();
        opts.download_tags(AutotagOption::All);
        remote
            .fetch(
                &[
                    "+refs/heads/*:refs/remotes/origin/*",
                    "+refs/tags/*:refs/tags/*",
                ],
                Some(&mut opts),
                None,
            )
            .map_err(err("fetch"))?;
        Ok(())
    }

    fn checkout(&self, dir: &Path, revision: &str) -> VcsResult<()> {
        let repo = Repository::open(dir).map_err(err("open"))?;
        let oid = Oid::from_str(revision).map_err(err("checkout"))?;
        repo.find_commit(oid).map_err(err("checkout"))?;
        checkout_detached(&repo, oid)
    }

    fn fetch(&self, dir: &Path, hint: Option<&RevisionHint>) -> VcsResult<String> {
        let repo = Repository::open(dir).map_err(err("open"))?;
        let mut remote = repo.find_remote("origin").map_err(err("remote"))?;

        let (refspec, local_ref) = refspec_for(hint);
        let mut opts = FetchOptions::new();
        opts.download_tags(AutotagOption::None);
        remote
            .fetch(&[refspec.as_str()], Some(&mut opts), None)
            .map_err(err("fetch"))?;

        Ok(fetched_commit(&repo, local_ref.as_deref())?.to_string())
    }

    fn current_revision(&self, dir: &Path) -> VcsResult<String> {
        let repo = Repository::open(dir).map_err(err("open"))?;
        let head = repo.head().map_err(err("rev-parse"))?;
        let commit = head.peel_to_commit().map_err(err("rev-parse"))?;
        Ok(commit.id().to_string())
    }

    fn commits_between(&self, dir: &Path, from: &str, to: &str) -> VcsResult<Vec<CommitSummary>> {
        let repo = Repository::open(dir).map_err(err("open"))?;
        let mut walk = repo.revwalk().map_err(err("log"))?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)
            .map_err(err("log"))?;
        walk.push(Oid::from_str(to).map_err(err("log"))?)
            .map_err(err("log"))?;
        walk.hide(Oid::from_str(from).map_err(err("log"))?)
            .map_err(err("log"))?;

        let mut commits = Vec::new();
        for oid in walk {
            let oid = oid.map_err(err("log"))?;
            let commit = repo.find_commit(oid).map_err(err("log"))?;
            commits.push(CommitSummary {
                id: oid.to_string(),
                summary: commit.summary().unwrap_or_default().to_string(),
            });
        }
        Ok(commits)
    }
}
