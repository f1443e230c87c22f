//! One on-disk repository: initialisation, staging, commits, and origin push/pull.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{BranchType, Commit, ErrorCode, Oid, PushOptions, Repository, RepositoryInitOptions, Signature};
use gitnotes_core::{Identity, RepositoryDescriptor, is_path_safe_name};
use tracing::{debug, info, warn};

use crate::error::GitStoreError;
use crate::transport::{PushReport, RefUpdate, RefUpdateStatus, Transport};
use crate::worktree::{TreeChanges, WorkingTreeMapper};

/// Name of the single remote.
pub const ORIGIN: &str = "origin";
/// Fetch refspec configured for [`ORIGIN`].
pub const ORIGIN_FETCH_REFSPEC: &str = "+refs/heads/*:refs/remotes/origin/*";
/// Branch name used for new repositories unless configured otherwise.
pub const DEFAULT_INITIAL_BRANCH: &str = "master";

/// Result of [`RepositoryHandle::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A new commit was created.
    Created(Oid),
    /// Nothing was staged; no commit was made.
    Unchanged,
}

/// Result of [`RepositoryHandle::pull`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// Local branch already contained the remote branch, or the remote has no such branch.
    UpToDate,
    /// Local branch moved forward to the remote commit.
    FastForwarded(Oid),
    /// A merge commit joined both histories.
    Merged(Oid),
    /// Local branch was hard-reset to the remote commit.
    Reset(Oid),
    /// The merge produced conflicts; nothing was changed.
    Conflicted(Vec<String>),
}

/// Owns one repository directory under the storage root.
///
/// A handle is not meant to be shared: callers run at most one operation per repository at a
/// time.
pub struct RepositoryHandle {
    repo: Repository,
    workdir: PathBuf,
    name: String,
}

impl RepositoryHandle {
    /// Open `<root>/<descriptor.name>`, initialising an empty repository there if needed.
    ///
    /// # Errors
    /// Returns [`GitStoreError::InvalidRepositoryName`] for names that are not a single safe
    /// path segment, and I/O or git errors when the directory cannot be created or opened.
    pub fn open_or_init(
        root: &Path,
        descriptor: &RepositoryDescriptor,
        initial_branch: &str,
    ) -> Result<Self, GitStoreError> {
        let name = descriptor.name.trim();
        if !is_path_safe_name(name) {
            return Err(GitStoreError::InvalidRepositoryName(descriptor.name.clone()));
        }
        let workdir = root.join(name);
        fs::create_dir_all(&workdir)?;

        let repo = if workdir.join(".git").exists() {
            debug!(repository = name, "Opening existing repository");
            Repository::open(&workdir)?
        } else {
            let mut options = RepositoryInitOptions::new();
            options.initial_head(initial_branch);
            let repo = Repository::init_opts(&workdir, &options)?;
            info!(repository = name, branch = initial_branch, "Initialised repository");
            repo
        };

        Ok(Self {
            repo,
            workdir,
            name: name.to_owned(),
        })
    }

    /// Repository name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Working tree directory.
    #[must_use]
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Note mapper over this working tree.
    #[must_use]
    pub fn mapper(&self) -> WorkingTreeMapper {
        WorkingTreeMapper::new(&self.workdir)
    }

    /// Stage written files and deletions for the next commit.
    ///
    /// Names that no longer exist on disk (added) or in the index (removed) are ignored.
    ///
    /// # Errors
    /// Returns a git error when the index cannot be updated or written.
    pub fn stage(&self, changes: &TreeChanges) -> Result<(), GitStoreError> {
        let mut index = self.repo.index()?;
        for name in &changes.added {
            if self.workdir.join(name).is_file() {
                index.add_path(Path::new(name))?;
            }
        }
        for name in &changes.removed {
            index.remove_path(Path::new(name))?;
        }
        index.write()?;
        Ok(())
    }

    /// Commit the index on the current branch.
    ///
    /// When the index matches HEAD (or is empty on an unborn branch) no commit is created and
    /// [`CommitOutcome::Unchanged`] is returned.
    ///
    /// # Errors
    /// Returns a git error for an invalid identity or when objects cannot be written.
    pub fn commit(&self, message: &str, identity: &Identity) -> Result<CommitOutcome, GitStoreError> {
        let mut index = self.repo.index()?;
        let tree_oid = index.write_tree()?;
        let parent = self.head_commit()?;
        let unchanged = parent
            .as_ref()
            .map_or_else(|| index.is_empty(), |commit| commit.tree_id() == tree_oid);
        if unchanged {
            debug!(repository = %self.name, "Nothing to commit");
            return Ok(CommitOutcome::Unchanged);
        }

        let sig = Signature::now(&identity.name, &identity.email)?;
        let tree = self.repo.find_tree(tree_oid)?;
        let parents: Vec<&Commit<'_>> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
        info!(%oid, repository = %self.name, "Committed notes");
        Ok(CommitOutcome::Created(oid))
    }

    /// Point `origin` at `url` with the default fetch refspec. Safe to call repeatedly.
    ///
    /// # Errors
    /// Returns a git error when the remote configuration cannot be written.
    pub fn configure_remote(&self, url: &str) -> Result<(), GitStoreError> {
        let url = url.trim();
        match self.repo.find_remote(ORIGIN) {
            Ok(remote) => {
                if remote.url() != Some(url) {
                    self.repo.remote_set_url(ORIGIN, url)?;
                }
                let has_refspec = remote
                    .fetch_refspecs()?
                    .iter()
                    .flatten()
                    .any(|spec| spec == ORIGIN_FETCH_REFSPEC);
                if !has_refspec {
                    self.repo.remote_add_fetch(ORIGIN, ORIGIN_FETCH_REFSPEC)?;
                }
            }
            Err(err) if err.code() == ErrorCode::NotFound => {
                self.repo.remote(ORIGIN, url)?;
                debug!(repository = %self.name, "Configured origin remote");
            }
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }

    /// URL of `origin`, if configured.
    #[must_use]
    pub fn remote_url(&self) -> Option<String> {
        let remote = self.repo.find_remote(ORIGIN).ok()?;
        remote.url().map(str::to_owned)
    }

    /// Push every local branch to `origin`.
    ///
    /// `origin` is fetched first so each branch gets its own status from the refreshed
    /// tracking refs: branches already at the tracked commit are up to date, branches that do
    /// not contain the tracked commit are rejected as non-fast-forward unless `force` is set.
    /// The remaining refs are pushed and the remote's per-ref answers recorded.
    ///
    /// # Errors
    /// Returns [`GitStoreError::RemoteNotConfigured`] without an origin, and transport errors
    /// when the remote cannot be reached or authentication fails.
    pub fn push(&self, transport: &Transport<'_>, force: bool) -> Result<PushReport, GitStoreError> {
        let branches = self.local_branches()?;
        let mut report = PushReport::default();
        if branches.is_empty() {
            debug!(repository = %self.name, "No local branches to push");
            return Ok(report);
        }

        let mut remote = self.find_origin()?;
        let mut fetch_options = transport.fetch_options();
        remote
            .fetch(&[] as &[&str], Some(&mut fetch_options), None)
            .map_err(GitStoreError::from_transport)?;

        let mut to_push = Vec::new();
        for (refname, local_oid) in branches {
            let branch = refname.strip_prefix("refs/heads/").unwrap_or(&refname);
            match self.tracking_oid(branch)? {
                Some(remote_oid) if remote_oid == local_oid => {
                    report.updates.push(RefUpdate::new(refname, RefUpdateStatus::UpToDate));
                }
                Some(remote_oid) if !force && !self.contains(local_oid, remote_oid) => {
                    report
                        .updates
                        .push(RefUpdate::new(refname, RefUpdateStatus::RejectedNonFastForward));
                }
                _ => to_push.push(refname),
            }
        }
        if to_push.is_empty() {
            return Ok(report);
        }

        let refspecs: Vec<String> = to_push
            .iter()
            .map(|refname| {
                if force {
                    format!("+{refname}:{refname}")
                } else {
                    format!("{refname}:{refname}")
                }
            })
            .collect();
        let answers: RefCell<HashMap<String, Option<String>>> = RefCell::new(HashMap::new());
        let pushed = {
            let mut callbacks = transport.callbacks();
            callbacks.push_update_reference(|refname, status| {
                answers
                    .borrow_mut()
                    .insert(refname.to_owned(), status.map(str::to_owned));
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);
            remote.push(&refspecs, Some(&mut options))
        };

        match pushed {
            Ok(()) => {
                let answers = answers.into_inner();
                for refname in to_push {
                    let status = match answers.get(&refname) {
                        Some(message) => RefUpdateStatus::from_remote_message(message.as_deref()),
                        None => RefUpdateStatus::Rejected("remote did not report a status".into()),
                    };
                    report.updates.push(RefUpdate::new(refname, status));
                }
            }
            Err(err) if err.code() == ErrorCode::NotFastForward => {
                for refname in to_push {
                    report
                        .updates
                        .push(RefUpdate::new(refname, RefUpdateStatus::RejectedNonFastForward));
                }
            }
            Err(err) => return Err(GitStoreError::from_transport(err)),
        }

        if report.is_success() {
            info!(repository = %self.name, refs = report.updates.len(), force, "Pushed to origin");
        } else {
            warn!(repository = %self.name, rejected = report.rejected().count(), "Push rejected");
        }
        Ok(report)
    }

    /// Fetch from `origin` and bring the local branch up to date.
    ///
    /// The branch is `configured` when given, otherwise derived: the current branch if it has
    /// commits, else the remote's advertised default, else the unborn current branch. When a
    /// derived branch does not exist on `origin`, the remote's default (or only) branch is used
    /// instead and a local branch holding unpublished commits is renamed to match it. An empty
    /// remote leaves the repository up to date.
    ///
    /// With `force` the local branch is hard-reset to the fetched remote branch, discarding local
    /// commits. Otherwise the remote branch is fast-forwarded or merged; a conflicting merge
    /// leaves the repository untouched and reports the conflicting paths.
    ///
    /// # Errors
    /// Returns transport errors for fetch failures,
    /// [`GitStoreError::MissingRemoteBranch`] when no remote branch can be matched, and git
    /// errors for local failures.
    pub fn pull(
        &self,
        transport: &Transport<'_>,
        configured: Option<&str>,
        force: bool,
        identity: &Identity,
    ) -> Result<PullOutcome, GitStoreError> {
        let mut remote = self.find_origin()?;
        let mut options = transport.fetch_options();
        remote
            .fetch(&[] as &[&str], Some(&mut options), None)
            .map_err(GitStoreError::from_transport)?;
        let advertised = remote
            .default_branch()
            .ok()
            .and_then(|buf| buf.as_str().and_then(|name| name.strip_prefix("refs/heads/")).map(str::to_owned))
            .or_else(|| self.origin_head());
        drop(remote);

        let configured = configured.map(str::trim).filter(|b| !b.is_empty());
        let Some(branch) = self.resolve_branch(configured, advertised.as_deref()) else {
            debug!(repository = %self.name, "No branch to pull");
            return Ok(PullOutcome::UpToDate);
        };
        let (branch, remote_oid) = match self.tracking_oid(&branch)? {
            Some(oid) => (branch, oid),
            None => {
                let remote_branches = self.remote_branches()?;
                if remote_branches.is_empty() {
                    debug!(repository = %self.name, "Remote has no branches");
                    return Ok(PullOutcome::UpToDate);
                }
                if configured.is_some() {
                    return Err(GitStoreError::MissingRemoteBranch(branch));
                }
                let Some(adopted) = advertised
                    .filter(|name| remote_branches.contains(name))
                    .or_else(|| match remote_branches.as_slice() {
                        [only] => Some(only.clone()),
                        _ => None,
                    })
                else {
                    return Err(GitStoreError::MissingRemoteBranch(branch));
                };
                self.adopt_branch(&branch, &adopted)?;
                let oid = self
                    .tracking_oid(&adopted)?
                    .ok_or_else(|| GitStoreError::MissingRemoteBranch(adopted.clone()))?;
                (adopted, oid)
            }
        };
        let local_ref = format!("refs/heads/{branch}");

        if force {
            self.move_branch(&local_ref, remote_oid, "pull: hard reset to origin")?;
            info!(repository = %self.name, %branch, oid = %remote_oid, "Reset branch to origin");
            return Ok(PullOutcome::Reset(remote_oid));
        }

        let local_oid = match self.repo.refname_to_id(&local_ref) {
            Ok(oid) => oid,
            Err(err) if err.code() == ErrorCode::NotFound => {
                self.move_branch(&local_ref, remote_oid, "pull: create branch from origin")?;
                info!(repository = %self.name, %branch, "Checked out branch from origin");
                return Ok(PullOutcome::FastForwarded(remote_oid));
            }
            Err(err) => return Err(err.into()),
        };

        if local_oid == remote_oid || self.contains(local_oid, remote_oid) {
            self.repo.set_head(&local_ref)?;
            return Ok(PullOutcome::UpToDate);
        }
        if self.contains(remote_oid, local_oid) {
            self.move_branch(&local_ref, remote_oid, "pull: fast-forward")?;
            info!(repository = %self.name, %branch, oid = %remote_oid, "Fast-forwarded");
            return Ok(PullOutcome::FastForwarded(remote_oid));
        }

        self.merge(&local_ref, &branch, local_oid, remote_oid, identity)
    }

    fn merge(
        &self,
        local_ref: &str,
        branch: &str,
        local_oid: Oid,
        remote_oid: Oid,
        identity: &Identity,
    ) -> Result<PullOutcome, GitStoreError> {
        let ours = self.repo.find_commit(local_oid)?;
        let theirs = self.repo.find_commit(remote_oid)?;
        let mut index = self.repo.merge_commits(&ours, &theirs, None)?;
        if index.has_conflicts() {
            let mut paths = Vec::new();
            for conflict in index.conflicts()? {
                let conflict = conflict?;
                let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
                if let Some(entry) = entry {
                    paths.push(String::from_utf8_lossy(&entry.path).into_owned());
                }
            }
            warn!(repository = %self.name, conflicts = paths.len(), "Merge conflict");
            return Ok(PullOutcome::Conflicted(paths));
        }

        let tree_oid = index.write_tree_to(&self.repo)?;
        let tree = self.repo.find_tree(tree_oid)?;
        let sig = Signature::now(&identity.name, &identity.email)?;
        let message = format!("Merge remote-tracking branch '{ORIGIN}/{branch}'");
        let oid = self
            .repo
            .commit(None, &sig, &sig, &message, &tree, &[&ours, &theirs])?;
        self.move_branch(local_ref, oid, "pull: merge")?;
        info!(repository = %self.name, %branch, %oid, "Merged origin");
        Ok(PullOutcome::Merged(oid))
    }

    /// Check out `target` over the working tree, then point `local_ref` and HEAD at it.
    ///
    /// Checking out before moving the ref keeps the old HEAD as the baseline, so files that
    /// disappear in `target` are removed from disk.
    fn move_branch(&self, local_ref: &str, target: Oid, reflog: &str) -> Result<(), GitStoreError> {
        let commit = self.repo.find_commit(target)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        self.repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;
        self.repo.reference(local_ref, target, true, reflog)?;
        self.repo.set_head(local_ref)?;
        Ok(())
    }

    fn resolve_branch(&self, configured: Option<&str>, advertised: Option<&str>) -> Option<String> {
        if let Some(branch) = configured {
            return Some(branch.to_owned());
        }
        let head_branch = self.head_branch();
        if head_branch.is_some() && self.head_commit().ok().flatten().is_some() {
            return head_branch;
        }
        advertised.map(str::to_owned).or(head_branch)
    }

    /// Rename the local branch `local` to `remote_name` when only `local` exists, so commits
    /// made before the first pull are published under the remote's branch name.
    fn adopt_branch(&self, local: &str, remote_name: &str) -> Result<(), GitStoreError> {
        if local == remote_name || self.repo.find_branch(remote_name, BranchType::Local).is_ok() {
            return Ok(());
        }
        match self.repo.find_branch(local, BranchType::Local) {
            Ok(mut branch) => {
                branch.rename(remote_name, false)?;
                info!(repository = %self.name, from = local, to = remote_name, "Renamed local branch to match origin");
                Ok(())
            }
            Err(err) if err.code() == ErrorCode::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Commit of `refs/remotes/origin/<branch>`, if fetched.
    fn tracking_oid(&self, branch: &str) -> Result<Option<Oid>, GitStoreError> {
        match self.repo.refname_to_id(&format!("refs/remotes/{ORIGIN}/{branch}")) {
            Ok(oid) => Ok(Some(oid)),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Branch names under `refs/remotes/origin/`, without the symbolic `HEAD`.
    fn remote_branches(&self) -> Result<Vec<String>, GitStoreError> {
        let prefix = format!("refs/remotes/{ORIGIN}/");
        let mut out = Vec::new();
        for branch in self.repo.branches(Some(BranchType::Remote))? {
            let (branch, _) = branch?;
            if let Some(name) = branch.get().name().and_then(|name| name.strip_prefix(&prefix))
                && name != "HEAD"
            {
                out.push(name.to_owned());
            }
        }
        out.sort();
        Ok(out)
    }

    /// Branch named by `refs/remotes/origin/HEAD`, when a clone or fetch recorded one.
    fn origin_head(&self) -> Option<String> {
        let head = self.repo.find_reference(&format!("refs/remotes/{ORIGIN}/HEAD")).ok()?;
        head.symbolic_target()
            .and_then(|target| target.strip_prefix(&format!("refs/remotes/{ORIGIN}/")))
            .map(str::to_owned)
    }

    /// Branch HEAD points at, born or not.
    fn head_branch(&self) -> Option<String> {
        let head = self.repo.find_reference("HEAD").ok()?;
        head.symbolic_target()
            .and_then(|target| target.strip_prefix("refs/heads/"))
            .map(str::to_owned)
    }

    fn head_commit(&self) -> Result<Option<Commit<'_>>, GitStoreError> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?)),
            Err(err) if matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Whether `descendant` already contains `ancestor` (false when `ancestor` is unknown locally).
    fn contains(&self, descendant: Oid, ancestor: Oid) -> bool {
        descendant == ancestor
            || self
                .repo
                .graph_descendant_of(descendant, ancestor)
                .unwrap_or(false)
    }

    fn local_branches(&self) -> Result<Vec<(String, Oid)>, GitStoreError> {
        let mut out = Vec::new();
        for branch in self.repo.branches(Some(BranchType::Local))? {
            let (branch, _) = branch?;
            let reference = branch.get();
            if let (Some(name), Some(oid)) = (reference.name(), reference.target()) {
                out.push((name.to_owned(), oid));
            }
        }
        Ok(out)
    }

    fn find_origin(&self) -> Result<git2::Remote<'_>, GitStoreError> {
        self.repo.find_remote(ORIGIN).map_err(|err| {
            if err.code() == ErrorCode::NotFound {
                GitStoreError::RemoteNotConfigured(ORIGIN.to_owned())
            } else {
                err.into()
            }
        })
    }
}

/// Delete every repository directory under `root`. Returns how many were removed.
///
/// # Errors
/// Returns an I/O error when a directory cannot be removed.
pub fn purge_repositories(root: &Path) -> Result<usize, GitStoreError> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };
    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() && path.join(".git").exists() {
            fs::remove_dir_all(&path)?;
            removed += 1;
        }
    }
    info!(root = %root.display(), removed, "Purged local repositories");
    Ok(removed)
}
