//! The uniform result of every sync operation.

use gitnotes_store_git::{GitStoreError, Mismatch, PushReport, RefUpdateStatus};
use thiserror::Error;

use crate::error::StoreError;

/// Structured cause carried by [`SyncResult::Failure`].
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote holds files that this application did not write.
    #[error("Remote is not a gitnotes repository: {file} ({reason})")]
    NotApplicationRepository {
        /// First offending file.
        file: String,
        /// What was wrong with it.
        reason: Mismatch,
    },

    /// The repository has no remote URL.
    #[error("Repository '{0}' has no remote configured")]
    NoRemote(String),

    /// The remote rejected the credential or none was available.
    #[error("Authentication failed: {0}")]
    Authentication(#[source] GitStoreError),

    /// Network or remote-side failure.
    #[error("Transport failed: {0}")]
    Transport(#[source] GitStoreError),

    /// The remote refused at least one ref update.
    #[error("Push rejected: {}", .0.join(", "))]
    PushRejected(Vec<String>),

    /// No remote branch matches the branch being pulled.
    #[error("Remote has no branch '{0}' to pull")]
    MissingRemoteBranch(String),

    /// Pulling produced conflicting changes to the same notes.
    #[error("Merge conflict in {}", .0.join(", "))]
    MergeConflict(Vec<String>),

    /// No author identity could be resolved for the commit.
    #[error("No commit identity: set [identity] in the config or GITNOTES_AUTHOR_NAME/GITNOTES_AUTHOR_EMAIL")]
    MissingIdentity,

    /// Local repository or working-tree failure.
    #[error("Local repository error: {0}")]
    Store(#[source] GitStoreError),

    /// The note store could not be read or updated.
    #[error("Note store error: {0}")]
    NoteStore(#[from] StoreError),

    /// The worker running the operation failed.
    #[error("Background task failed: {0}")]
    Background(String),
}

impl From<GitStoreError> for SyncError {
    fn from(err: GitStoreError) -> Self {
        match err {
            GitStoreError::Authentication(_) => Self::Authentication(err),
            GitStoreError::Transport(_) => Self::Transport(err),
            GitStoreError::MissingRemoteBranch(branch) => Self::MissingRemoteBranch(branch),
            other => Self::Store(other),
        }
    }
}

/// Outcome of one sync operation.
#[derive(Debug)]
#[must_use]
pub enum SyncResult {
    /// The operation completed.
    Success,
    /// The operation failed; nothing past the failing step was attempted.
    Failure {
        /// Why, when known.
        cause: Option<SyncError>,
        /// The push was rejected only because the remote has commits the local branch lacks;
        /// retrying with force would succeed.
        needs_force: bool,
    },
}

impl SyncResult {
    /// Plain failure.
    pub const fn failed(cause: SyncError) -> Self {
        Self::Failure {
            cause: Some(cause),
            needs_force: false,
        }
    }

    /// Failure that can be retried as a force operation.
    pub const fn force_required(cause: SyncError) -> Self {
        Self::Failure {
            cause: Some(cause),
            needs_force: true,
        }
    }

    /// Classify a push report: any rejection fails the push, and the failure needs force when
    /// every rejection was non-fast-forward.
    pub fn from_push_report(report: &PushReport) -> Self {
        if report.is_success() {
            return Self::Success;
        }
        let refs = report
            .rejected()
            .map(|update| match &update.status {
                RefUpdateStatus::RejectedNonFastForward => format!("{} (non-fast-forward)", update.refname),
                RefUpdateStatus::Rejected(reason) => format!("{} ({reason})", update.refname),
                RefUpdateStatus::Ok | RefUpdateStatus::UpToDate => update.refname.clone(),
            })
            .collect();
        let cause = SyncError::PushRejected(refs);
        if report.needs_force() {
            Self::force_required(cause)
        } else {
            Self::failed(cause)
        }
    }

    /// Whether the operation completed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Whether a force retry is suggested.
    #[must_use]
    pub const fn needs_force(&self) -> bool {
        matches!(self, Self::Failure { needs_force: true, .. })
    }

    /// Failure cause, if any.
    #[must_use]
    pub const fn cause(&self) -> Option<&SyncError> {
        match self {
            Self::Success => None,
            Self::Failure { cause, .. } => cause.as_ref(),
        }
    }
}

impl From<SyncError> for SyncResult {
    fn from(cause: SyncError) -> Self {
        Self::failed(cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitnotes_store_git::RefUpdate;

    fn report(statuses: Vec<RefUpdateStatus>) -> PushReport {
        PushReport {
            updates: statuses
                .into_iter()
                .enumerate()
                .map(|(idx, status)| RefUpdate::new(format!("refs/heads/b{idx}"), status))
                .collect(),
        }
    }

    #[test]
    fn up_to_date_push_is_success() {
        let result = SyncResult::from_push_report(&report(vec![RefUpdateStatus::UpToDate]));
        assert!(result.is_success());
        assert!(result.cause().is_none());
    }

    #[test]
    fn non_fast_forward_only_needs_force() {
        let result = SyncResult::from_push_report(&report(vec![
            RefUpdateStatus::Ok,
            RefUpdateStatus::RejectedNonFastForward,
        ]));
        assert!(!result.is_success());
        assert!(result.needs_force());
        let Some(SyncError::PushRejected(refs)) = result.cause() else {
            panic!("expected push rejection, got {result:?}");
        };
        assert_eq!(refs, &vec!["refs/heads/b1 (non-fast-forward)".to_owned()]);
    }

    #[test]
    fn other_rejection_is_plain_failure() {
        let result = SyncResult::from_push_report(&report(vec![RefUpdateStatus::Rejected(
            "hook declined".into(),
        )]));
        assert!(!result.is_success());
        assert!(!result.needs_force());
    }

    #[test]
    fn transport_errors_keep_their_kind() {
        let auth = git2::Error::new(git2::ErrorCode::Auth, git2::ErrorClass::Http, "denied");
        let err = SyncError::from(GitStoreError::from_transport(auth));
        assert!(matches!(err, SyncError::Authentication(_)));

        let io = SyncError::from(GitStoreError::from(std::io::Error::other("disk full")));
        assert!(matches!(io, SyncError::Store(_)));
        assert!(io.to_string().contains("disk full"));
    }
}
