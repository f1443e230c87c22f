//! Per-attempt state machine of a sync operation.

use tracing::debug;

use crate::result::{SyncError, SyncResult};

/// Where a sync attempt currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Nothing started yet.
    Idle,
    /// Cloning the remote into scratch space to inspect it.
    Verifying,
    /// The remote could not be verified or holds foreign files.
    VerificationFailed,
    /// The remote holds only note files.
    Verified,
    /// Pushing to or pulling from the remote.
    Transporting,
    /// Finished successfully.
    Succeeded,
    /// The remote refused the push.
    Rejected {
        /// A force retry would succeed.
        needs_force: bool,
    },
    /// Failed for any other reason.
    Errored,
}

impl SyncPhase {
    /// Whether the attempt has finished.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::VerificationFailed | Self::Succeeded | Self::Rejected { .. } | Self::Errored
        )
    }
}

/// One run of a sync operation, logging every phase change.
#[derive(Debug)]
pub struct SyncAttempt {
    operation: &'static str,
    repository: String,
    history: Vec<SyncPhase>,
}

impl SyncAttempt {
    /// Start an attempt in [`SyncPhase::Idle`].
    pub fn begin(operation: &'static str, repository: impl Into<String>) -> Self {
        let attempt = Self {
            operation,
            repository: repository.into(),
            history: vec![SyncPhase::Idle],
        };
        debug!(operation, repository = %attempt.repository, "Sync attempt started");
        attempt
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        self.history.last().copied().unwrap_or(SyncPhase::Idle)
    }

    /// Every phase entered so far, starting with [`SyncPhase::Idle`].
    #[must_use]
    pub fn history(&self) -> &[SyncPhase] {
        &self.history
    }

    /// Move to `next`. Ignored once the attempt is terminal.
    pub fn advance(&mut self, next: SyncPhase) {
        let from = self.phase();
        if from.is_terminal() {
            return;
        }
        debug!(
            operation = self.operation,
            repository = %self.repository,
            ?from,
            to = ?next,
            "Sync phase"
        );
        self.history.push(next);
    }

    /// Finish the attempt: enter the terminal phase matching `outcome` and return it as a
    /// [`SyncResult`].
    pub fn conclude(&mut self, outcome: Result<SyncResult, SyncError>) -> SyncResult {
        let result = outcome.unwrap_or_else(SyncResult::from);
        let terminal = match (&result, self.phase()) {
            (SyncResult::Success, _) => SyncPhase::Succeeded,
            (_, SyncPhase::Verifying) => SyncPhase::VerificationFailed,
            (
                SyncResult::Failure {
                    cause: Some(SyncError::PushRejected(_)),
                    needs_force,
                },
                _,
            ) => SyncPhase::Rejected {
                needs_force: *needs_force,
            },
            _ => SyncPhase::Errored,
        };
        self.advance(terminal);
        match &result {
            SyncResult::Success => debug!(operation = self.operation, repository = %self.repository, "Sync succeeded"),
            SyncResult::Failure { cause, needs_force } => {
                let cause = cause.as_ref().map_or_else(String::new, ToString::to_string);
                debug!(
                    operation = self.operation,
                    repository = %self.repository,
                    needs_force,
                    %cause,
                    "Sync failed"
                );
            }
        }
        result
    }
}
