//! Dependency reconciliation.
//!
//! The manifest is the intent, the lockfile the pinned reality, and `deps/`
//! the materialized state. Every command here loads the first two, brings the
//! three back in line for the packages it touches, and persists only what
//! actually changed.
//!
//! ## Commands
//!
//! - `vend add <spec> [--dev]` - Declare, fetch and pin a dependency
//! - `vend remove <name>` - Drop declaration, collection, pin and working copy
//! - `vend update [name] [--dry-run]` - Move pins to the current ref tips
//! - `vend install [--frozen]` - Materialize everything the manifest declares
//! - `vend list` / `vend lock --check` - Read-only views

use super::fetch::{Fetcher, InstallState};
use crate::config::{Declared, DependencyKind, Manifest, Project};
use crate::error::{Error, Result};
use crate::lock::{LockFile, PackageLock, Pin};
use crate::specifier::{self, ParsedSpecifier};
use crate::vcs::{CommitSummary, SourceControl, short_hash};
use colored::*;
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Refuse to resolve anything that is not already pinned.
    pub frozen: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallSummary {
    pub fetched: Vec<String>,
    pub restored: Vec<String>,
    pub unchanged: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub name: String,
    pub old: String,
    pub new: String,
    pub commits: Vec<CommitSummary>,
    /// False for dry runs.
    pub applied: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    pub kind: DependencyKind,
    pub specifier: String,
    pub pin: Option<Pin>,
    /// `None` when the declared specifier does not parse.
    pub state: Option<InstallState>,
}

enum Outcome {
    Fetched,
    Restored,
    Unchanged,
}

pub struct Reconciler<'a> {
    project: &'a Project,
    fetcher: Fetcher<'a>,
}

/// Lock entry for `dep`, ignored if it was pinned for a different specifier.
fn matching_entry<'l>(lock: &'l LockFile, dep: &Declared) -> Option<&'l PackageLock> {
    lock.get(&dep.name)
        .filter(|entry| entry.specifier == dep.specifier)
}

fn ensure_pinned(declared: &[Declared], lock: &LockFile) -> Result<()> {
    match declared
        .iter()
        .find(|dep| matching_entry(lock, dep).is_none())
    {
        Some(dep) => Err(Error::LockfileIncomplete {
            name: dep.name.clone(),
        }),
        None => Ok(()),
    }
}

/// Persist a removal, manifest first.
///
/// If the lockfile write fails afterwards, the stale entry it leaves behind
/// is reported by `lock --check` and pruned by the next install. The other
/// order could leave a declared package with no pin.
fn save_removal(
    manifest: Option<(&Manifest, PathBuf)>,
    lock: Option<(&LockFile, PathBuf)>,
) -> Result<()> {
    if let Some((manifest, path)) = manifest {
        manifest.save(&path)?;
    }
    if let Some((lock, path)) = lock {
        lock.save(&path)?;
    }
    Ok(())
}

fn print_update(report: &UpdateReport) {
    let verb = if report.applied { "Updated" } else { "Would update" };
    println!(
        "   {} {} {} {} → {} ({} commits)",
        "↑".cyan(),
        verb,
        report.name.bold(),
        short_hash(&report.old).dimmed(),
        short_hash(&report.new).green(),
        report.commits.len()
    );
    for commit in &report.commits {
        println!(
            "       {} {}",
            short_hash(&commit.id).yellow(),
            commit.summary
        );
    }
}

impl<'a> Reconciler<'a> {
    pub fn new(project: &'a Project, vcs: &'a dyn SourceControl) -> Self {
        Self {
            project,
            fetcher: Fetcher::new(project, vcs),
        }
    }

    fn load(&self) -> Result<(Manifest, LockFile)> {
        let manifest = Manifest::load(&self.project.manifest_path())?;
        let lock = LockFile::load(&self.project.lock_path())?;
        Ok((manifest, lock))
    }

    /// Bring one declared dependency to the Installed state.
    fn install_one(
        &self,
        dep: &Declared,
        parsed: &ParsedSpecifier,
        lock: &mut LockFile,
        frozen: bool,
    ) -> Result<Outcome> {
        let name = dep.name.as_str();
        let source = &parsed.source;
        let state = self.fetcher.install_state(name, source);
        debug!("{} is {:?}", name, state);

        if source.is_local() {
            let outcome = if matches!(state, InstallState::Installed(_)) {
                Outcome::Unchanged
            } else {
                self.fetcher.link_local(name, source)?;
                Outcome::Fetched
            };
            lock.set(
                name,
                PackageLock {
                    specifier: dep.specifier.clone(),
                    resolved: source.origin().to_string(),
                    commit: Pin::Local,
                },
            );
            return Ok(outcome);
        }

        let entry = matching_entry(lock, dep);
        let pinned = entry.and_then(|e| e.commit.commit()).map(str::to_string);
        let stale = lock.get(name).is_some() && entry.is_none();

        match (state, pinned) {
            (InstallState::Installed(Pin::Commit(current)), Some(pinned)) => {
                if current == pinned {
                    return Ok(Outcome::Unchanged);
                }
                if frozen {
                    info!("{} drifted to {}, restoring {}", name, current, pinned);
                    if let Err(e) = self.fetcher.checkout(name, &pinned) {
                        debug!("in-place checkout failed ({}), re-fetching", e);
                        self.fetcher.pin_exact(name, source, &pinned)?;
                    }
                    return Ok(Outcome::Restored);
                }
                warn!("{} is at {} but locked to {}", name, current, pinned);
                println!(
                    "   {} {} is at {} but locked to {} (run 'vend install --frozen' to restore)",
                    "!".yellow(),
                    name,
                    short_hash(&current),
                    short_hash(&pinned)
                );
                Ok(Outcome::Unchanged)
            }
            (InstallState::Installed(Pin::Commit(current)), None) if !stale => {
                info!("adopting {} at {}", name, current);
                lock.set(
                    name,
                    PackageLock {
                        specifier: dep.specifier.clone(),
                        resolved: source.origin().to_string(),
                        commit: Pin::Commit(current),
                    },
                );
                Ok(Outcome::Unchanged)
            }
            (state, pinned) => {
                if state != InstallState::NotInstalled {
                    debug!("discarding {} working copy of {}", state.label(), name);
                    self.fetcher.remove_working_copy(name)?;
                }
                let revision = match pinned {
                    Some(rev) => {
                        self.fetcher.pin_exact(name, source, &rev)?;
                        rev
                    }
                    None => self.fetcher.acquire(name, source)?,
                };
                lock.set(
                    name,
                    PackageLock {
                        specifier: dep.specifier.clone(),
                        resolved: source.origin().to_string(),
                        commit: Pin::Commit(revision),
                    },
                );
                Ok(Outcome::Fetched)
            }
        }
    }

    /// Materialize every declared dependency.
    ///
    /// Packages are processed independently: successes are committed to the
    /// lockfile even when others fail, and the failures are reported together
    /// as [`Error::BatchFailed`].
    pub fn install(&self, options: InstallOptions) -> Result<InstallSummary> {
        let (mut manifest, mut lock) = self.load()?;
        let declared = manifest.declared();

        if options.frozen {
            ensure_pinned(&declared, &lock)?;
        }

        let original_lock = lock.clone();
        let mut manifest_changed = false;
        let mut summary = InstallSummary::default();
        let mut failed = Vec::new();

        if declared.is_empty() {
            println!("{} No dependencies declared in vend.json.", "ℹ".blue());
        } else {
            println!(
                "{} Checking {} dependencies...",
                "📦".blue(),
                declared.len()
            );
        }

        for dep in &declared {
            let result = specifier::parse(&dep.specifier)
                .and_then(|parsed| self.install_one(dep, &parsed, &mut lock, options.frozen));
            match result {
                Ok(outcome) => {
                    match outcome {
                        Outcome::Fetched => summary.fetched.push(dep.name.clone()),
                        Outcome::Restored => summary.restored.push(dep.name.clone()),
                        Outcome::Unchanged => {
                            println!("   {} Up to date: {}", "⚡".green(), dep.name);
                            summary.unchanged.push(dep.name.clone());
                        }
                    }
                    if manifest.collection(&dep.name).is_none() {
                        manifest_changed |= manifest
                            .set_collection(&dep.name, &self.project.collection_path(&dep.name));
                    }
                }
                Err(e) => {
                    println!("{} {}", "x".red(), e);
                    failed.push(dep.name.clone());
                }
            }
        }

        if !options.frozen {
            for name in lock.retain(|name| declared.iter().any(|d| d.name == name)) {
                println!("   {} Dropped stale lock entry: {}", "🗑️".red(), name);
            }
        }

        if lock != original_lock {
            lock.save(&self.project.lock_path())?;
        }
        if manifest_changed {
            manifest.save(&self.project.manifest_path())?;
        }

        if !failed.is_empty() {
            return Err(Error::BatchFailed {
                failed,
                total: declared.len(),
            });
        }

        if !declared.is_empty() {
            println!(
                "{} Dependencies ready ({} fetched, {} restored, {} up to date).",
                "✓".green(),
                summary.fetched.len(),
                summary.restored.len(),
                summary.unchanged.len()
            );
        }
        Ok(summary)
    }

    /// Declare a new dependency, fetch it and pin it.
    ///
    /// A name that is already declared is updated rather than rejected.
    pub fn add(&self, spec: &str, dev: bool) -> Result<()> {
        let spec = spec.trim();
        let parsed = specifier::parse(spec)?;
        let (mut manifest, mut lock) = self.load()?;
        let kind = if dev {
            DependencyKind::Dev
        } else {
            DependencyKind::Regular
        };

        println!("{} Adding dependency: {}...", "📦".blue(), parsed.name.bold());

        match manifest.declare(kind, &parsed.name, spec) {
            Ok(()) => {}
            Err(Error::PackageAlreadyExists { name }) => {
                if manifest.replace_specifier(&name, spec) {
                    println!("{} '{}' re-declared as {}", "!".yellow(), name, spec);
                } else if matches!(
                    self.fetcher.install_state(&name, &parsed.source),
                    InstallState::Installed(_)
                ) {
                    println!("{} '{}' already exists, updating instead.", "!".yellow(), name);
                    self.update(Some(&name), false)?;
                    return Ok(());
                }
            }
            Err(e) => return Err(e),
        }

        let dep = manifest
            .find(&parsed.name)
            .ok_or_else(|| Error::PackageNotInstalled {
                name: parsed.name.clone(),
            })?;
        self.install_one(&dep, &parsed, &mut lock, false)?;
        manifest.set_collection(&dep.name, &self.project.collection_path(&dep.name));

        lock.save(&self.project.lock_path())?;
        manifest.save(&self.project.manifest_path())?;

        println!(
            "{} Added {} to {}",
            "✓".green(),
            dep.name.bold(),
            dep.kind.key()
        );
        Ok(())
    }

    /// Remove a dependency everywhere it is recorded.
    ///
    /// The manifest and then the lockfile are written before the working copy
    /// is deleted, so a failed write never leaves configuration pointing at a
    /// directory that is already gone.
    pub fn remove(&self, name: &str) -> Result<()> {
        let not_installed = || Error::PackageNotInstalled {
            name: name.to_string(),
        };
        if !specifier::is_valid_name(name) {
            return Err(not_installed());
        }

        let (mut manifest, mut lock) = self.load()?;
        let undeclared = manifest.undeclare(name);
        let collection_removed = manifest.remove_collection(name);
        let unlocked = lock.remove(name);
        let on_disk = std::fs::symlink_metadata(self.project.working_copy(name)).is_ok();

        if undeclared.is_none() && !collection_removed && !unlocked && !on_disk {
            return Err(not_installed());
        }

        save_removal(
            (undeclared.is_some() || collection_removed)
                .then(|| (&manifest, self.project.manifest_path())),
            unlocked.then(|| (&lock, self.project.lock_path())),
        )?;
        self.fetcher.remove_working_copy(name)?;

        println!("{} Removed dependency: {}", "🗑️".red(), name.bold());
        Ok(())
    }

    fn update_one(
        &self,
        dep: &Declared,
        lock: &mut LockFile,
        dry_run: bool,
        explicit: bool,
    ) -> Result<Option<UpdateReport>> {
        let name = dep.name.as_str();
        let parsed = specifier::parse(&dep.specifier)?;
        let source = &parsed.source;

        if source.is_local() {
            println!("   {} {} is a local path, nothing to update", "⚡".green(), name);
            return Ok(None);
        }

        let InstallState::Installed(Pin::Commit(current)) = self.fetcher.install_state(name, source)
        else {
            if explicit {
                return Err(Error::PackageNotInstalled {
                    name: name.to_string(),
                });
            }
            println!(
                "   {} {} is not installed (run 'vend install')",
                "!".yellow(),
                name
            );
            return Ok(None);
        };

        let old = matching_entry(lock, dep)
            .and_then(|e| e.commit.commit())
            .map(str::to_string)
            .unwrap_or(current);
        let new = self.fetcher.refresh(name, source)?;

        if new == old {
            println!(
                "   {} {} is up to date ({})",
                "✓".green(),
                name,
                short_hash(&old)
            );
            return Ok(None);
        }

        let commits = self
            .fetcher
            .commits_between(name, &old, &new)
            .unwrap_or_else(|e| {
                debug!("could not list commits for {}: {}", name, e);
                Vec::new()
            });

        if !dry_run {
            self.fetcher.checkout(name, &new)?;
            lock.set(
                name,
                PackageLock {
                    specifier: dep.specifier.clone(),
                    resolved: source.origin().to_string(),
                    commit: Pin::Commit(new.clone()),
                },
            );
        }

        Ok(Some(UpdateReport {
            name: name.to_string(),
            old,
            new,
            commits,
            applied: !dry_run,
        }))
    }

    /// Move pins to the current tip of each followed ref.
    ///
    /// With `dry_run` the same resolution happens but neither the lockfile,
    /// the manifest, nor any working tree is modified.
    pub fn update(&self, name: Option<&str>, dry_run: bool) -> Result<Vec<UpdateReport>> {
        let (manifest, mut lock) = self.load()?;
        let targets = match name {
            Some(n) => vec![manifest.find(n).ok_or_else(|| Error::PackageNotInstalled {
                name: n.to_string(),
            })?],
            None => manifest.declared(),
        };

        if dry_run {
            println!("{} Checking for updates (dry run)...", "📦".blue());
        } else {
            println!("{} Checking for updates...", "📦".blue());
        }

        let original_lock = lock.clone();
        let mut reports = Vec::new();
        let mut failed = Vec::new();

        for dep in &targets {
            match self.update_one(dep, &mut lock, dry_run, name.is_some()) {
                Ok(Some(report)) => {
                    print_update(&report);
                    reports.push(report);
                }
                Ok(None) => {}
                Err(e) if name.is_some() => return Err(e),
                Err(e) => {
                    println!("{} {}", "x".red(), e);
                    failed.push(dep.name.clone());
                }
            }
        }

        if !dry_run && lock != original_lock {
            lock.save(&self.project.lock_path())?;
        }

        if !failed.is_empty() {
            return Err(Error::BatchFailed {
                failed,
                total: targets.len(),
            });
        }

        if reports.is_empty() {
            println!("{} All dependencies are up to date.", "✓".green());
        } else if dry_run {
            println!(
                "{} {} dependencies can be updated. Run 'vend update' to apply.",
                "ℹ".blue(),
                reports.len()
            );
        } else {
            println!("{} Dependencies updated.", "✓".green());
        }
        Ok(reports)
    }

    pub fn list(&self) -> Result<Vec<ListEntry>> {
        let (manifest, lock) = self.load()?;
        Ok(manifest
            .declared()
            .into_iter()
            .map(|dep| {
                let state = specifier::parse(&dep.specifier)
                    .ok()
                    .map(|parsed| self.fetcher.install_state(&dep.name, &parsed.source));
                ListEntry {
                    pin: lock.get(&dep.name).map(|e| e.commit.clone()),
                    name: dep.name,
                    kind: dep.kind,
                    specifier: dep.specifier,
                    state,
                }
            })
            .collect())
    }

    /// Consistency problems between the manifest and the lockfile.
    /// Touches neither the network nor any working copy.
    pub fn verify(&self) -> Result<Vec<String>> {
        let (manifest, lock) = self.load()?;
        let declared = manifest.declared();
        let mut problems = Vec::new();

        for dep in &declared {
            match lock.get(&dep.name) {
                None => problems.push(format!("'{}' is missing from vend.lock", dep.name)),
                Some(entry) if entry.specifier != dep.specifier => problems.push(format!(
                    "'{}' is locked for '{}' but declared as '{}'",
                    dep.name, entry.specifier, dep.specifier
                )),
                Some(_) => {}
            }
        }
        for name in lock.packages.keys() {
            if !declared.iter().any(|d| &d.name == name) {
                problems.push(format!("'{}' is locked but not declared", name));
            }
        }
        Ok(problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::mock::MockVcs;
    use std::fs;
    use std::path::Path;

    const WIDGETS: &str = "https://github.com/acme/widgets";
    const GADGETS: &str = "https://github.com/acme/gadgets";
    const REV_A: &str = "abc1230000000000000000000000000000000000";
    const REV_B: &str = "bcd2340000000000000000000000000000000000";
    const REV_C: &str = "cde3450000000000000000000000000000000000";

    fn project_with(manifest: &str) -> (tempfile::TempDir, Project) {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("vend.json"), manifest).unwrap();
        let project = Project::new(tmp.path());
        (tmp, project)
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    fn head(project: &Project, name: &str) -> String {
        read(&project.working_copy(name).join(".mock-head"))
    }

    fn pinned(project: &Project, name: &str) -> Option<Pin> {
        LockFile::load(&project.lock_path())
            .unwrap()
            .get(name)
            .map(|e| e.commit.clone())
    }

    #[test]
    fn test_add_then_install_does_not_refetch() {
        let (_tmp, project) = project_with(r#"{"name": "app"}"#);
        let vcs = MockVcs::new().with_remote(WIDGETS, &[REV_A]);
        let reconciler = Reconciler::new(&project, &vcs);

        reconciler.add("acme/widgets", false).unwrap();
        assert_eq!(pinned(&project, "widgets"), Some(Pin::Commit(REV_A.to_string())));
        let lock_after_add = read(&project.lock_path());
        let manifest_after_add = read(&project.manifest_path());
        assert!(manifest_after_add.contains("\"widgets\": \"acme/widgets\""));
        assert!(manifest_after_add.contains("\"widgets\": \"deps/widgets\""));

        // Upstream moves on; install must stay on the pin and not hit the network.
        vcs.push_commits(WIDGETS, &[REV_B]);
        let before = vcs.network_calls();
        let summary = reconciler.install(InstallOptions::default()).unwrap();

        assert_eq!(vcs.network_calls(), before);
        assert_eq!(summary.unchanged, ["widgets"]);
        assert_eq!(read(&project.lock_path()), lock_after_add);
        assert_eq!(read(&project.manifest_path()), manifest_after_add);
        assert_eq!(pinned(&project, "widgets"), Some(Pin::Commit(REV_A.to_string())));
    }

    #[test]
    fn test_install_is_idempotent() {
        let (_tmp, project) = project_with(
            r#"{"dependencies": {"widgets": "acme/widgets", "gadgets": "acme/gadgets@v2"}}"#,
        );
        let vcs = MockVcs::new()
            .with_remote(WIDGETS, &[REV_A])
            .with_remote(GADGETS, &[REV_B]);
        let reconciler = Reconciler::new(&project, &vcs);

        let first = reconciler.install(InstallOptions::default()).unwrap();
        assert_eq!(first.fetched, ["widgets", "gadgets"]);
        let lock = read(&project.lock_path());
        let manifest = read(&project.manifest_path());
        let calls = vcs.network_calls();

        let second = reconciler.install(InstallOptions::default()).unwrap();
        assert!(second.fetched.is_empty());
        assert_eq!(vcs.network_calls(), calls);
        assert_eq!(read(&project.lock_path()), lock);
        assert_eq!(read(&project.manifest_path()), manifest);
        assert!(lock.find("\"gadgets\"").unwrap() < lock.find("\"widgets\"").unwrap());
    }

    #[test]
    fn test_frozen_install_requires_every_pin() {
        let (_tmp, project) = project_with(
            r#"{"dependencies": {"widgets": "acme/widgets"}, "devDependencies": {"gadgets": "acme/gadgets"}}"#,
        );
        let mut lock = LockFile::default();
        lock.set(
            "widgets",
            PackageLock {
                specifier: "acme/widgets".to_string(),
                resolved: WIDGETS.to_string(),
                commit: Pin::Commit(REV_A.to_string()),
            },
        );
        lock.save(&project.lock_path()).unwrap();
        let lock_before = read(&project.lock_path());

        let vcs = MockVcs::new()
            .with_remote(WIDGETS, &[REV_A])
            .with_remote(GADGETS, &[REV_B]);
        let err = Reconciler::new(&project, &vcs)
            .install(InstallOptions { frozen: true })
            .unwrap_err();

        assert!(matches!(err, Error::LockfileIncomplete { ref name } if name == "gadgets"));
        assert_eq!(vcs.call_count(), 0);
        assert!(!project.deps_dir().exists());
        assert_eq!(read(&project.lock_path()), lock_before);
    }

    #[test]
    fn test_frozen_install_restores_drift() {
        let (_tmp, project) = project_with(r#"{"dependencies": {"widgets": "acme/widgets"}}"#);
        let vcs = MockVcs::new().with_remote(WIDGETS, &[REV_A, REV_B]);
        let reconciler = Reconciler::new(&project, &vcs);
        reconciler.install(InstallOptions::default()).unwrap();
        assert_eq!(head(&project, "widgets"), REV_B);

        // Someone checks out an older commit by hand.
        fs::write(project.working_copy("widgets").join(".mock-head"), REV_A).unwrap();

        // Plain install only warns.
        reconciler.install(InstallOptions::default()).unwrap();
        assert_eq!(head(&project, "widgets"), REV_A);

        let summary = reconciler.install(InstallOptions { frozen: true }).unwrap();
        assert_eq!(summary.restored, ["widgets"]);
        assert_eq!(head(&project, "widgets"), REV_B);
    }

    #[test]
    fn test_install_uses_pin_when_working_copy_missing() {
        let (_tmp, project) = project_with(r#"{"dependencies": {"widgets": "acme/widgets"}}"#);
        let vcs = MockVcs::new().with_remote(WIDGETS, &[REV_A]);
        let reconciler = Reconciler::new(&project, &vcs);
        reconciler.install(InstallOptions::default()).unwrap();

        fs::remove_dir_all(project.deps_dir()).unwrap();
        vcs.push_commits(WIDGETS, &[REV_B]);
        reconciler.install(InstallOptions { frozen: true }).unwrap();

        assert_eq!(head(&project, "widgets"), REV_A);
        assert!(
            vcs.calls
                .borrow()
                .iter()
                .any(|c| c == &format!("clone_bare {}", WIDGETS))
        );
    }

    #[test]
    fn test_corrupt_working_copy_is_refetched() {
        let (_tmp, project) = project_with(r#"{"dependencies": {"widgets": "acme/widgets"}}"#);
        fs::create_dir_all(project.working_copy("widgets")).unwrap();
        fs::write(project.working_copy("widgets").join("half-written"), "x").unwrap();

        let vcs = MockVcs::new().with_remote(WIDGETS, &[REV_A]);
        let summary = Reconciler::new(&project, &vcs)
            .install(InstallOptions::default())
            .unwrap();

        assert_eq!(summary.fetched, ["widgets"]);
        assert_eq!(head(&project, "widgets"), REV_A);
        assert!(!project.working_copy("widgets").join("half-written").exists());
    }

    #[test]
    fn test_changed_specifier_reacquires() {
        let (_tmp, project) = project_with(r#"{"dependencies": {"widgets": "acme/widgets"}}"#);
        let vcs = MockVcs::new()
            .with_remote(WIDGETS, &[REV_A])
            .with_remote("https://example.com/widgets.git", &[REV_C]);
        let reconciler = Reconciler::new(&project, &vcs);
        reconciler.install(InstallOptions::default()).unwrap();

        fs::write(
            project.manifest_path(),
            r#"{"dependencies": {"widgets": "git:https://example.com/widgets.git"}}"#,
        )
        .unwrap();
        reconciler.install(InstallOptions::default()).unwrap();

        let lock = LockFile::load(&project.lock_path()).unwrap();
        let entry = lock.get("widgets").unwrap();
        assert_eq!(entry.specifier, "git:https://example.com/widgets.git");
        assert_eq!(entry.commit, Pin::Commit(REV_C.to_string()));
        assert_eq!(head(&project, "widgets"), REV_C);
    }

    #[test]
    fn test_batch_install_commits_successes() {
        let (_tmp, project) = project_with(
            r#"{"dependencies": {"gadgets": "acme/gadgets", "widgets": "acme/widgets", "broken": "not a spec"}}"#,
        );
        let vcs = MockVcs::new()
            .with_remote(WIDGETS, &[REV_A])
            .with_remote(GADGETS, &[REV_B]);
        vcs.fail_url(GADGETS);

        let err = Reconciler::new(&project, &vcs)
            .install(InstallOptions::default())
            .unwrap_err();

        match err {
            Error::BatchFailed { failed, total } => {
                assert_eq!(failed, ["gadgets", "broken"]);
                assert_eq!(total, 3);
            }
            other => panic!("expected BatchFailed, got {other:?}"),
        }
        assert_eq!(pinned(&project, "widgets"), Some(Pin::Commit(REV_A.to_string())));
        assert_eq!(pinned(&project, "gadgets"), None);
        assert!(!project.working_copy("gadgets").exists());
    }

    #[test]
    fn test_install_drops_undeclared_pins() {
        let (_tmp, project) = project_with(r#"{"dependencies": {}}"#);
        let mut lock = LockFile::default();
        lock.set(
            "ghost",
            PackageLock {
                specifier: "acme/ghost".to_string(),
                resolved: "https://github.com/acme/ghost".to_string(),
                commit: Pin::Commit(REV_A.to_string()),
            },
        );
        lock.save(&project.lock_path()).unwrap();

        let vcs = MockVcs::new();
        Reconciler::new(&project, &vcs)
            .install(InstallOptions::default())
            .unwrap();
        assert_eq!(pinned(&project, "ghost"), None);
    }

    #[test]
    fn test_add_failure_persists_nothing() {
        let (_tmp, project) = project_with(r#"{"name": "app"}"#);
        let vcs = MockVcs::new();
        let err = Reconciler::new(&project, &vcs)
            .add("acme/widgets", false)
            .unwrap_err();

        assert!(matches!(err, Error::FetchFailed { .. }));
        assert_eq!(read(&project.manifest_path()), r#"{"name": "app"}"#);
        assert!(!project.lock_path().exists());
        assert!(!project.working_copy("widgets").exists());
    }

    #[test]
    fn test_add_existing_is_treated_as_update() {
        let (_tmp, project) = project_with(r#"{"name": "app"}"#);
        let vcs = MockVcs::new().with_remote(WIDGETS, &[REV_A]);
        let reconciler = Reconciler::new(&project, &vcs);
        reconciler.add("acme/widgets", true).unwrap();

        vcs.push_commits(WIDGETS, &[REV_B]);
        reconciler.add("acme/widgets", false).unwrap();

        assert_eq!(pinned(&project, "widgets"), Some(Pin::Commit(REV_B.to_string())));
        let manifest = Manifest::load(&project.manifest_path()).unwrap();
        assert_eq!(manifest.find("widgets").unwrap().kind, DependencyKind::Dev);
    }

    #[test]
    fn test_invalid_specifier_rejected_before_io() {
        let (_tmp, project) = project_with(r#"{"name": "app"}"#);
        let vcs = MockVcs::new();
        let err = Reconciler::new(&project, &vcs)
            .add("owner/repo@v1#main", false)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSpecifier(_)));
        assert_eq!(vcs.call_count(), 0);
    }

    #[test]
    fn test_remove_unknown_package_leaves_manifest_alone() {
        let original = r#"{"dependencies": {"widgets": "acme/widgets"}}"#;
        let (_tmp, project) = project_with(original);
        let modified_before = fs::metadata(project.manifest_path())
            .unwrap()
            .modified()
            .unwrap();

        let vcs = MockVcs::new();
        let err = Reconciler::new(&project, &vcs).remove("gadgets").unwrap_err();

        assert!(matches!(err, Error::PackageNotInstalled { ref name } if name == "gadgets"));
        assert_eq!(read(&project.manifest_path()), original);
        assert_eq!(
            fs::metadata(project.manifest_path())
                .unwrap()
                .modified()
                .unwrap(),
            modified_before
        );
        assert!(!project.lock_path().exists());
    }

    #[test]
    fn test_remove_rejects_path_like_names() {
        let (_tmp, project) = project_with("{}");
        let vcs = MockVcs::new();
        let err = Reconciler::new(&project, &vcs).remove("..").unwrap_err();
        assert!(matches!(err, Error::PackageNotInstalled { .. }));
    }

    #[test]
    fn test_remove_clears_every_record() {
        let (_tmp, project) = project_with(r#"{"name": "app"}"#);
        let vcs = MockVcs::new()
            .with_remote(WIDGETS, &[REV_A])
            .with_remote(GADGETS, &[REV_B]);
        let reconciler = Reconciler::new(&project, &vcs);
        reconciler.add("acme/widgets", false).unwrap();
        reconciler.add("acme/gadgets", true).unwrap();

        reconciler.remove("gadgets").unwrap();

        let manifest = Manifest::load(&project.manifest_path()).unwrap();
        assert!(manifest.find("gadgets").is_none());
        assert!(manifest.collection("gadgets").is_none());
        assert!(manifest.find("widgets").is_some());
        assert_eq!(pinned(&project, "gadgets"), None);
        assert!(!project.working_copy("gadgets").exists());
        assert!(project.working_copy("widgets").exists());
    }

    #[test]
    fn test_update_dry_run_mutates_nothing() {
        let (_tmp, project) = project_with(r#"{"dependencies": {"widgets": "acme/widgets"}}"#);
        let vcs = MockVcs::new().with_remote(WIDGETS, &[REV_A]);
        let reconciler = Reconciler::new(&project, &vcs);
        reconciler.install(InstallOptions::default()).unwrap();
        let lock_before = read(&project.lock_path());

        vcs.push_commits(WIDGETS, &[REV_B, REV_C]);
        let reports = reconciler.update(None, true).unwrap();

        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.old, REV_A);
        assert_eq!(report.new, REV_C);
        assert!(!report.applied);
        let ids: Vec<&str> = report.commits.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, [REV_C, REV_B]);

        assert_eq!(read(&project.lock_path()), lock_before);
        assert_eq!(head(&project, "widgets"), REV_A);
    }

    #[test]
    fn test_update_moves_pin_to_tip() {
        let (_tmp, project) = project_with(r#"{"dependencies": {"widgets": "acme/widgets"}}"#);
        let vcs = MockVcs::new().with_remote(WIDGETS, &[REV_A]);
        let reconciler = Reconciler::new(&project, &vcs);
        reconciler.install(InstallOptions::default()).unwrap();

        vcs.push_commits(WIDGETS, &[REV_B]);
        let reports = reconciler.update(Some("widgets"), false).unwrap();

        assert!(reports[0].applied);
        assert_eq!(pinned(&project, "widgets"), Some(Pin::Commit(REV_B.to_string())));
        assert_eq!(head(&project, "widgets"), REV_B);
    }

    #[test]
    fn test_update_without_new_commits_writes_nothing() {
        let (_tmp, project) = project_with(r#"{"dependencies": {"widgets": "acme/widgets"}}"#);
        let vcs = MockVcs::new().with_remote(WIDGETS, &[REV_A]);
        let reconciler = Reconciler::new(&project, &vcs);
        reconciler.install(InstallOptions::default()).unwrap();
        let modified = fs::metadata(project.lock_path()).unwrap().modified().unwrap();

        let reports = reconciler.update(None, false).unwrap();
        assert!(reports.is_empty());
        assert_eq!(
            fs::metadata(project.lock_path()).unwrap().modified().unwrap(),
            modified
        );
    }

    #[test]
    fn test_update_unknown_or_missing_package() {
        let (_tmp, project) = project_with(r#"{"dependencies": {"widgets": "acme/widgets"}}"#);
        let vcs = MockVcs::new().with_remote(WIDGETS, &[REV_A]);
        let reconciler = Reconciler::new(&project, &vcs);

        let err = reconciler.update(Some("gadgets"), false).unwrap_err();
        assert!(matches!(err, Error::PackageNotInstalled { .. }));
        let err = reconciler.update(Some("widgets"), false).unwrap_err();
        assert!(matches!(err, Error::PackageNotInstalled { .. }));
        assert_eq!(vcs.network_calls(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_local_dependencies_are_never_pinned() {
        let (tmp, project) = project_with(r#"{"name": "app"}"#);
        fs::create_dir_all(tmp.path().join("shared").join("mathlib")).unwrap();
        let vcs = MockVcs::new();
        let reconciler = Reconciler::new(&project, &vcs);

        reconciler.add("path:shared/mathlib", false).unwrap();
        assert_eq!(pinned(&project, "mathlib"), Some(Pin::Local));
        assert!(project.working_copy("mathlib").is_dir());

        assert!(reconciler.update(None, false).unwrap().is_empty());
        let summary = reconciler.install(InstallOptions { frozen: true }).unwrap();
        assert_eq!(summary.unchanged, ["mathlib"]);
        assert_eq!(vcs.call_count(), 0);
    }

    #[test]
    fn test_path_like_manifest_key_never_reaches_disk() {
        let (tmp, project) = project_with(r#"{"dependencies": {"../victim": "acme/widgets"}}"#);
        let victim = tmp.path().join("victim");
        fs::create_dir_all(&victim).unwrap();
        fs::write(victim.join("important.txt"), "keep me").unwrap();

        let vcs = MockVcs::new().with_remote(WIDGETS, &[REV_A]);
        let reconciler = Reconciler::new(&project, &vcs);

        let err = reconciler.install(InstallOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidManifest { .. }), "{err}");
        assert!(matches!(
            reconciler.update(None, false).unwrap_err(),
            Error::InvalidManifest { .. }
        ));
        assert!(matches!(
            reconciler.list().unwrap_err(),
            Error::InvalidManifest { .. }
        ));

        assert_eq!(read(&victim.join("important.txt")), "keep me");
        assert_eq!(vcs.call_count(), 0);
    }

    #[test]
    fn test_malformed_lock_commit_is_an_error() {
        let (_tmp, project) = project_with(r#"{"dependencies": {"widgets": "acme/widgets"}}"#);
        fs::write(
            project.lock_path(),
            r#"{"version": 1, "packages": {"widgets": {"specifier": "acme/widgets", "resolved": "https://github.com/acme/widgets", "commit": "ééééééé"}}}"#,
        )
        .unwrap();

        let vcs = MockVcs::new().with_remote(WIDGETS, &[REV_A]);
        let reconciler = Reconciler::new(&project, &vcs);
        assert!(matches!(
            reconciler.install(InstallOptions::default()).unwrap_err(),
            Error::Json(_)
        ));
        assert!(matches!(reconciler.list().unwrap_err(), Error::Json(_)));
        assert_eq!(vcs.call_count(), 0);
    }

    #[test]
    fn test_removal_writes_manifest_before_lockfile() {
        let (tmp, project) = project_with(r#"{"dependencies": {"widgets": "acme/widgets"}}"#);
        let vcs = MockVcs::new().with_remote(WIDGETS, &[REV_A]);
        let reconciler = Reconciler::new(&project, &vcs);
        reconciler.install(InstallOptions::default()).unwrap();

        let mut manifest = Manifest::load(&project.manifest_path()).unwrap();
        let mut lock = LockFile::load(&project.lock_path()).unwrap();
        manifest.undeclare("widgets");
        manifest.remove_collection("widgets");
        lock.remove("widgets");

        // A regular file where the lockfile's directory should be.
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let err = save_removal(
            Some((&manifest, project.manifest_path())),
            Some((&lock, blocker.join("vend.lock"))),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Io(_)), "{err}");

        // The manifest no longer declares it; the leftover pin is only stale.
        assert!(!read(&project.manifest_path()).contains("widgets"));
        assert_eq!(pinned(&project, "widgets"), Some(Pin::Commit(REV_A.to_string())));
        let problems = reconciler.verify().unwrap();
        assert_eq!(problems, ["'widgets' is locked but not declared"]);

        reconciler.install(InstallOptions::default()).unwrap();
        assert_eq!(pinned(&project, "widgets"), None);
        assert!(reconciler.verify().unwrap().is_empty());
    }

    #[test]
    fn test_list_and_verify() {
        let (_tmp, project) = project_with(
            r#"{"dependencies": {"widgets": "acme/widgets"}, "devDependencies": {"gadgets": "acme/gadgets"}}"#,
        );
        let mut lock = LockFile::default();
        lock.set(
            "widgets",
            PackageLock {
                specifier: "acme/widgets@v1".to_string(),
                resolved: WIDGETS.to_string(),
                commit: Pin::Commit(REV_A.to_string()),
            },
        );
        lock.set(
            "orphan",
            PackageLock {
                specifier: "acme/orphan".to_string(),
                resolved: "https://github.com/acme/orphan".to_string(),
                commit: Pin::Commit(REV_B.to_string()),
            },
        );
        lock.save(&project.lock_path()).unwrap();

        let vcs = MockVcs::new();
        let reconciler = Reconciler::new(&project, &vcs);

        let entries = reconciler.list().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "widgets");
        assert_eq!(entries[0].state, Some(InstallState::NotInstalled));
        assert_eq!(entries[1].kind, DependencyKind::Dev);
        assert_eq!(entries[1].pin, None);

        let problems = reconciler.verify().unwrap();
        assert_eq!(problems.len(), 3);
        assert!(problems.iter().any(|p| p.contains("gadgets")));
        assert!(problems.iter().any(|p| p.contains("orphan")));
        assert!(problems.iter().any(|p| p.contains("acme/widgets@v1")));
        assert_eq!(vcs.call_count(), 0);
    }
}
