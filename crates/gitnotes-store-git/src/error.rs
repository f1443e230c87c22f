//! Error types for gitnotes store operations.

use git2::ErrorCode;
use thiserror::Error;

/// Errors that can occur during repository, working-tree and transport operations.
#[derive(Error, Debug)]
pub enum GitStoreError {
    /// Repository name cannot be used as a directory name.
    #[error("Invalid repository name: {0:?}")]
    InvalidRepositoryName(String),

    /// The `origin` remote has not been configured.
    #[error("Remote '{0}' is not configured")]
    RemoteNotConfigured(String),

    /// `origin` has no branch to pull from under this name.
    #[error("Remote 'origin' has no branch '{0}'")]
    MissingRemoteBranch(String),

    /// The remote rejected the supplied credential, or none was available.
    #[error("Authentication failed: {0}")]
    Authentication(#[source] git2::Error),

    /// Network, protocol or remote-side failure.
    #[error("Transport error: {0}")]
    Transport(#[source] git2::Error),

    /// Local git repository error.
    #[error("Git repository error: {0}")]
    GitError(#[from] git2::Error),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl GitStoreError {
    /// Classify an error raised while talking to a remote.
    #[must_use]
    pub fn from_transport(err: git2::Error) -> Self {
        if err.code() == ErrorCode::Auth {
            Self::Authentication(err)
        } else {
            Self::Transport(err)
        }
    }

    /// Whether the failure happened on the wire rather than locally.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Authentication(_) | Self::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::ErrorClass;

    #[test]
    fn auth_errors_are_classified_separately() {
        let err = GitStoreError::from_transport(git2::Error::new(
            ErrorCode::Auth,
            ErrorClass::Http,
            "denied",
        ));
        assert!(matches!(err, GitStoreError::Authentication(_)));
        assert!(err.is_transport());

        let err = GitStoreError::from_transport(git2::Error::new(
            ErrorCode::GenericError,
            ErrorClass::Net,
            "unreachable",
        ));
        assert!(matches!(err, GitStoreError::Transport(_)));
    }

    #[test]
    fn local_errors_are_not_transport() {
        let err = GitStoreError::from(std::io::Error::other("disk full"));
        assert!(!err.is_transport());
        assert!(err.to_string().contains("disk full"));
    }
}
