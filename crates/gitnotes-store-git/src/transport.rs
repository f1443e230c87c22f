//! Credentials, deadlines and push reports for talking to a remote.

use std::time::Instant;

use git2::{Cred, ErrorClass, ErrorCode, FetchOptions, RemoteCallbacks};
use gitnotes_core::Credential;
use tracing::debug;

/// Per-operation transport settings: the credential to offer and an optional deadline.
#[derive(Debug, Clone, Copy, Default)]
pub struct Transport<'a> {
    credential: Option<&'a Credential>,
    deadline: Option<Instant>,
}

impl<'a> Transport<'a> {
    /// Transport offering `credential` (ignored when its token is empty) until `deadline`.
    #[must_use]
    pub fn new(credential: Option<&'a Credential>, deadline: Option<Instant>) -> Self {
        Self {
            credential: credential.filter(|cred| cred.is_usable()),
            deadline,
        }
    }

    /// Deadline passed through to progress callbacks.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Callbacks for one connection.
    ///
    /// The credential is offered once; libgit2 asks again after a rejection, which is answered
    /// with an authentication error instead of looping. Transfers report progress through
    /// callbacks that abort once the deadline has passed.
    #[must_use]
    pub fn callbacks(&self) -> RemoteCallbacks<'a> {
        let credential = self.credential;
        let mut attempts = 0_u32;
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |url, _username_from_url, allowed| {
            attempts += 1;
            if attempts > 1 {
                debug!(url, "Credential rejected by remote");
                return Err(auth_error("credentials were rejected by the remote"));
            }
            match credential {
                Some(cred) if allowed.is_user_pass_plaintext() => {
                    Cred::userpass_plaintext(&cred.username, &cred.token)
                }
                Some(_) => Err(auth_error("remote requested an unsupported authentication method")),
                None => Err(auth_error("remote requires authentication but no credential is available")),
            }
        });
        if let Some(deadline) = self.deadline {
            callbacks.transfer_progress(move |_| Instant::now() < deadline);
            callbacks.sideband_progress(move |_| Instant::now() < deadline);
        }
        callbacks
    }

    /// Fetch options carrying [`Transport::callbacks`].
    #[must_use]
    pub fn fetch_options(&self) -> FetchOptions<'a> {
        let mut options = FetchOptions::new();
        options.remote_callbacks(self.callbacks());
        options
    }
}

fn auth_error(message: &str) -> git2::Error {
    git2::Error::new(ErrorCode::Auth, ErrorClass::Http, message)
}

/// Outcome of pushing one ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefUpdateStatus {
    /// The remote accepted the update.
    Ok,
    /// The remote already pointed at the local commit.
    UpToDate,
    /// The remote has commits the local branch does not.
    RejectedNonFastForward,
    /// Rejected for any other reason.
    Rejected(String),
}

impl RefUpdateStatus {
    /// Classify a status message reported by the remote for one ref.
    #[must_use]
    pub fn from_remote_message(message: Option<&str>) -> Self {
        match message {
            None => Self::Ok,
            Some(msg) if is_non_fast_forward_message(msg) => Self::RejectedNonFastForward,
            Some(msg) => Self::Rejected(msg.to_owned()),
        }
    }

    /// Whether this update counts as a rejection.
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::RejectedNonFastForward | Self::Rejected(_))
    }
}

fn is_non_fast_forward_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("non-fast-forward") || lower.contains("fetch first")
}

/// Status of one ref in a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    /// Full ref name, e.g. `refs/heads/main`.
    pub refname: String,
    /// What happened to it.
    pub status: RefUpdateStatus,
}

impl RefUpdate {
    /// Pair a ref with its status.
    pub fn new(refname: impl Into<String>, status: RefUpdateStatus) -> Self {
        Self {
            refname: refname.into(),
            status,
        }
    }
}

/// Per-ref results of a push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// One entry per pushed local branch.
    pub updates: Vec<RefUpdate>,
}

impl PushReport {
    /// Rejected updates.
    pub fn rejected(&self) -> impl Iterator<Item = &RefUpdate> {
        self.updates.iter().filter(|update| update.status.is_rejected())
    }

    /// True when no ref was rejected; up-to-date refs count as success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.rejected().next().is_none()
    }

    /// True when at least one ref was rejected and every rejection is non-fast-forward.
    #[must_use]
    pub fn needs_force(&self) -> bool {
        let mut rejected = self.rejected().peekable();
        rejected.peek().is_some()
            && rejected.all(|update| update.status == RefUpdateStatus::RejectedNonFastForward)
    }
}
