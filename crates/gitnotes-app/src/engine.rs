//! The sync engine: commit, verified push, verified pull and verified clone.
//!
//! Every operation returns a [`SyncResult`]; lower-level errors never escape. The engine is not
//! internally synchronised per repository: callers run at most one operation per repository at
//! a time ([`crate::AsyncSyncEngine`] does this for async callers).

use std::path::PathBuf;
use std::time::{Duration, Instant};

use gitnotes_core::{Credential, Identity, Note, RepositoryDescriptor};
use gitnotes_store_git::{
    CommitOutcome, DEFAULT_INITIAL_BRANCH, GitStoreError, PullOutcome, RemoteVerifier, RepositoryHandle, Transport,
    Verification,
    purge_repositories,
};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info};

use crate::config::is_reserved_name;
use crate::identity::{merge_identity, resolve_identity};
use crate::note_store::NoteStore;
use crate::phase::{SyncAttempt, SyncPhase};
use crate::result::{SyncError, SyncResult};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Directory holding one subdirectory per repository.
    pub root: PathBuf,
    /// Directory for verification clones.
    pub scratch: PathBuf,
    /// Branch to pull; derived per repository when `None`.
    pub branch: Option<String>,
    /// Branch name for newly initialised repositories.
    pub initial_branch: String,
    /// Deadline for each transport operation.
    pub timeout: Option<Duration>,
    /// Commit identity taking precedence over environment and Git configuration.
    pub identity: Option<Identity>,
}

impl SyncSettings {
    /// Defaults rooted at `root`, with scratch clones under `<root>/scratch`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            scratch: root.join(crate::config::SCRATCH_DIR),
            root,
            branch: None,
            initial_branch: DEFAULT_INITIAL_BRANCH.to_owned(),
            timeout: None,
            identity: None,
        }
    }

    /// Use `identity` for commits.
    #[must_use]
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Always pull `branch`.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Initialise new repositories on `branch`.
    #[must_use]
    pub fn with_initial_branch(mut self, branch: impl Into<String>) -> Self {
        self.initial_branch = branch.into();
        self
    }
}

/// Composes repository handles, the working-tree mapper and the remote verifier into the
/// caller-facing sync operations.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    settings: SyncSettings,
    verifier: RemoteVerifier,
}

impl SyncEngine {
    /// Engine with `settings`.
    #[must_use]
    pub fn new(settings: SyncSettings) -> Self {
        let verifier = RemoteVerifier::new(&settings.scratch);
        Self { settings, verifier }
    }

    /// Active settings.
    #[must_use]
    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Open or initialise the repository for `descriptor` under the storage root.
    ///
    /// # Errors
    /// Returns [`SyncError::Store`] for path-unsafe or reserved names and local I/O failures.
    pub fn open_repository(&self, descriptor: &RepositoryDescriptor) -> Result<RepositoryHandle, SyncError> {
        reject_reserved(&descriptor.name)?;
        RepositoryHandle::open_or_init(&self.settings.root, descriptor, &self.settings.initial_branch)
            .map_err(SyncError::from)
    }

    /// Write `notes` into the working tree and commit them.
    ///
    /// The message defaults to one derived from the current time. Committing an unchanged
    /// collection succeeds without creating a commit.
    pub fn commit_notes(&self, handle: &RepositoryHandle, notes: &[Note], message: Option<&str>) -> SyncResult {
        let mut attempt = SyncAttempt::begin("commit", handle.name());
        let outcome = self.commit_inner(handle, notes, message);
        attempt.conclude(outcome)
    }

    /// [`SyncEngine::commit_notes`] over a snapshot of `store`.
    pub fn commit_store<S: NoteStore + ?Sized>(
        &self,
        handle: &RepositoryHandle,
        store: &S,
        message: Option<&str>,
    ) -> SyncResult {
        match store.list() {
            Ok(notes) => self.commit_notes(handle, &notes, message),
            Err(err) => SyncResult::failed(err.into()),
        }
    }

    fn commit_inner(
        &self,
        handle: &RepositoryHandle,
        notes: &[Note],
        message: Option<&str>,
    ) -> Result<SyncResult, SyncError> {
        let identity = self.identity(handle).ok_or(SyncError::MissingIdentity)?;
        let changes = handle.mapper().materialize(notes)?;
        handle.stage(&changes)?;
        let message = message.map_or_else(default_commit_message, str::to_owned);
        match handle.commit(&message, &identity)? {
            CommitOutcome::Created(oid) => {
                info!(repository = handle.name(), %oid, notes = notes.len(), "Committed notes");
            }
            CommitOutcome::Unchanged => debug!(repository = handle.name(), "Notes unchanged"),
        }
        Ok(SyncResult::Success)
    }

    /// Verify `remote_url`, then push every local branch to it.
    ///
    /// An empty `remote_url` falls back to the repository's configured `origin`.
    /// A rejection where every refused ref is non-fast-forward yields a failure with
    /// `needs_force`; the caller may retry with `force` after confirmation. Verification runs
    /// for forced pushes too.
    pub fn verified_push(
        &self,
        handle: &RepositoryHandle,
        remote_url: &str,
        credential: Option<&Credential>,
        force: bool,
    ) -> SyncResult {
        let mut attempt = SyncAttempt::begin("push", handle.name());
        let outcome = self.push_inner(&mut attempt, handle, remote_url, credential, force);
        attempt.conclude(outcome)
    }

    fn push_inner(
        &self,
        attempt: &mut SyncAttempt,
        handle: &RepositoryHandle,
        remote_url: &str,
        credential: Option<&Credential>,
        force: bool,
    ) -> Result<SyncResult, SyncError> {
        let url = remote_for(handle, remote_url)?;
        let transport = self.transport(credential);
        self.verify(attempt, &url, &transport)?;

        handle.configure_remote(&url)?;
        attempt.advance(SyncPhase::Transporting);
        let report = handle.push(&transport, force)?;
        Ok(SyncResult::from_push_report(&report))
    }

    /// Verify `remote_url`, pull from it and repopulate `store` from the working tree.
    ///
    /// An empty `remote_url` falls back to the repository's configured `origin`.
    /// With `force` the local branch is hard-reset to the remote branch first, discarding local
    /// commits. On failure the store is untouched, and a conflicting merge leaves the local
    /// branch where it was.
    pub fn verified_pull<S: NoteStore + ?Sized>(
        &self,
        handle: &RepositoryHandle,
        remote_url: &str,
        credential: Option<&Credential>,
        force: bool,
        store: &S,
    ) -> SyncResult {
        let mut attempt = SyncAttempt::begin("pull", handle.name());
        let outcome = self.pull_inner(&mut attempt, handle, remote_url, credential, force, store);
        attempt.conclude(outcome)
    }

    fn pull_inner<S: NoteStore + ?Sized>(
        &self,
        attempt: &mut SyncAttempt,
        handle: &RepositoryHandle,
        remote_url: &str,
        credential: Option<&Credential>,
        force: bool,
        store: &S,
    ) -> Result<SyncResult, SyncError> {
        let url = remote_for(handle, remote_url)?;
        let transport = self.transport(credential);
        self.verify(attempt, &url, &transport)?;

        handle.configure_remote(&url)?;
        attempt.advance(SyncPhase::Transporting);
        self.pull_and_load(handle, &transport, force, store)?;
        Ok(SyncResult::Success)
    }

    /// Verify `remote_url`, create the local repository for `descriptor`, pull everything and
    /// replace the contents of `store` with the cloned notes.
    pub fn verified_clone<S: NoteStore + ?Sized>(
        &self,
        descriptor: &RepositoryDescriptor,
        remote_url: &str,
        credential: Option<&Credential>,
        store: &S,
    ) -> SyncResult {
        let mut attempt = SyncAttempt::begin("clone", descriptor.name.as_str());
        let outcome = self.clone_inner(&mut attempt, descriptor, remote_url, credential, store);
        attempt.conclude(outcome)
    }

    fn clone_inner<S: NoteStore + ?Sized>(
        &self,
        attempt: &mut SyncAttempt,
        descriptor: &RepositoryDescriptor,
        remote_url: &str,
        credential: Option<&Credential>,
        store: &S,
    ) -> Result<SyncResult, SyncError> {
        reject_reserved(&descriptor.name)?;
        let url = require_remote(&descriptor.name, remote_url)?;
        let transport = self.transport(credential);
        self.verify(attempt, url, &transport)?;

        let handle = self.open_repository(descriptor)?;
        handle.configure_remote(url)?;
        attempt.advance(SyncPhase::Transporting);
        self.pull_and_load(&handle, &transport, false, store)?;
        info!(repository = handle.name(), "Cloned repository");
        Ok(SyncResult::Success)
    }

    /// Delete every local repository directory. The note store is left alone.
    pub fn purge(&self) -> SyncResult {
        let mut attempt = SyncAttempt::begin("purge", "*");
        let outcome = purge_repositories(&self.settings.root)
            .map(|_| SyncResult::Success)
            .map_err(SyncError::from);
        attempt.conclude(outcome)
    }

    fn pull_and_load<S: NoteStore + ?Sized>(
        &self,
        handle: &RepositoryHandle,
        transport: &Transport<'_>,
        force: bool,
        store: &S,
    ) -> Result<(), SyncError> {
        let identity = merge_identity(self.identity(handle));
        let outcome = handle.pull(transport, self.settings.branch.as_deref(), force, &identity)?;
        if let PullOutcome::Conflicted(paths) = &outcome {
            return Err(SyncError::MergeConflict(paths.clone()));
        }
        debug!(repository = handle.name(), ?outcome, "Pulled from origin");

        let notes = handle.mapper().read()?;
        let count = notes.len();
        store.replace_all(notes)?;
        info!(repository = handle.name(), notes = count, "Reloaded notes from working tree");
        Ok(())
    }

    fn verify(&self, attempt: &mut SyncAttempt, url: &str, transport: &Transport<'_>) -> Result<(), SyncError> {
        attempt.advance(SyncPhase::Verifying);
        match self.verifier.verify(url, transport)? {
            Verification::Conforming { .. } => {
                attempt.advance(SyncPhase::Verified);
                Ok(())
            }
            Verification::Foreign { file, reason } => Err(SyncError::NotApplicationRepository { file, reason }),
        }
    }

    fn transport<'a>(&self, credential: Option<&'a Credential>) -> Transport<'a> {
        let deadline = self.settings.timeout.map(|timeout| Instant::now() + timeout);
        Transport::new(credential, deadline)
    }

    fn identity(&self, handle: &RepositoryHandle) -> Option<Identity> {
        resolve_identity(self.settings.identity.as_ref(), handle.workdir())
    }
}

fn require_remote<'a>(repository: &str, remote_url: &'a str) -> Result<&'a str, SyncError> {
    let url = remote_url.trim();
    if url.is_empty() {
        return Err(SyncError::NoRemote(repository.to_owned()));
    }
    Ok(url)
}

/// `remote_url`, or the URL `origin` was last configured with.
fn reject_reserved(name: &str) -> Result<(), SyncError> {
    if is_reserved_name(name) {
        return Err(SyncError::Store(GitStoreError::InvalidRepositoryName(name.to_owned())));
    }
    Ok(())
}

fn remote_for(handle: &RepositoryHandle, remote_url: &str) -> Result<String, SyncError> {
    let url = remote_url.trim();
    if !url.is_empty() {
        return Ok(url.to_owned());
    }
    handle
        .remote_url()
        .filter(|configured| !configured.trim().is_empty())
        .ok_or_else(|| SyncError::NoRemote(handle.name().to_owned()))
}

fn default_commit_message() -> String {
    let now = OffsetDateTime::now_utc();
    let stamp = now
        .format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    format!("Update notes {stamp}")
}
