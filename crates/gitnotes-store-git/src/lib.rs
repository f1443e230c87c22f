//! Git-backed storage for gitnotes: note files in a working tree, commits, and origin sync.
//!
//! Each repository lives at `<root>/<name>` as an ordinary non-bare git repository whose only
//! tracked content is one note file per note. [`RepositoryHandle`] owns such a directory,
//! [`WorkingTreeMapper`] converts between notes and files, and [`RemoteVerifier`] checks a
//! remote in a scratch clone before anything is pushed to or pulled from it.

mod error;
mod handle;
mod transport;
mod verify;
mod worktree;

pub use error::GitStoreError;
pub use handle::{
    CommitOutcome, DEFAULT_INITIAL_BRANCH, ORIGIN, ORIGIN_FETCH_REFSPEC, PullOutcome, RepositoryHandle,
    purge_repositories,
};
pub use transport::{PushReport, RefUpdate, RefUpdateStatus, Transport};
pub use verify::{Mismatch, RemoteVerifier, Verification, inspect_tree};
pub use worktree::{TreeChanges, WorkingTreeMapper};
