use std::process::ExitCode;

use gitnotes_app::{AsyncSyncEngine, NoteStore, SyncResult};
use gitnotes_core::{Credential, RepositoryDescriptor};

/// Sync operation whose outcome is being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Commit,
    Push,
    Pull,
    Clone,
    Purge,
}

impl Operation {
    const fn name(self) -> &'static str {
        match self {
            Self::Commit => "Commit",
            Self::Push => "Push",
            Self::Pull => "Pull",
            Self::Clone => "Clone",
            Self::Purge => "Purge",
        }
    }

    fn done(self, repo: &str) -> String {
        match self {
            Self::Commit => format!("Committed notes in '{repo}'"),
            Self::Push => format!("Successfully pushed '{repo}' to its remote"),
            Self::Pull => format!("Successfully pulled '{repo}' and reloaded notes"),
            Self::Clone => format!("Cloned '{repo}' and loaded its notes"),
            Self::Purge => "Deleted all local repositories".to_owned(),
        }
    }
}

/// One status line for `result`: `Ok` for success, `Err` for anything else.
pub fn status_line(op: Operation, repo: &str, result: &SyncResult) -> Result<String, String> {
    if result.is_success() {
        return Ok(op.done(repo));
    }
    if result.needs_force() {
        return Err(format!(
            "{} of '{repo}' was rejected because the histories diverged; re-run with --force to overwrite",
            op.name()
        ));
    }
    let cause = result
        .cause()
        .map_or_else(|| "unknown error".to_owned(), ToString::to_string);
    Err(format!("{} of '{repo}' failed: {cause}", op.name()))
}

/// Print the status line and map the outcome to an exit code.
pub fn report(op: Operation, repo: &str, result: &SyncResult) -> ExitCode {
    match status_line(op, repo, result) {
        Ok(line) => {
            println!("{line}");
            ExitCode::SUCCESS
        }
        Err(line) => {
            eprintln!("{line}");
            ExitCode::FAILURE
        }
    }
}

pub async fn run_commit<S: NoteStore + 'static>(
    engine: &AsyncSyncEngine<S>,
    descriptor: RepositoryDescriptor,
    message: Option<String>,
) -> ExitCode {
    let repo = descriptor.name.clone();
    let result = engine.commit(descriptor, message).await;
    report(Operation::Commit, &repo, &result)
}

pub async fn run_push<S: NoteStore + 'static>(
    engine: &AsyncSyncEngine<S>,
    descriptor: RepositoryDescriptor,
    credential: Option<Credential>,
    force: bool,
) -> ExitCode {
    let repo = descriptor.name.clone();
    let result = engine.push(descriptor, credential, force).await;
    report(Operation::Push, &repo, &result)
}

pub async fn run_pull<S: NoteStore + 'static>(
    engine: &AsyncSyncEngine<S>,
    descriptor: RepositoryDescriptor,
    credential: Option<Credential>,
    force: bool,
) -> ExitCode {
    let repo = descriptor.name.clone();
    let result = engine.pull(descriptor, credential, force).await;
    report(Operation::Pull, &repo, &result)
}

pub async fn run_clone<S: NoteStore + 'static>(
    engine: &AsyncSyncEngine<S>,
    descriptor: RepositoryDescriptor,
    credential: Option<Credential>,
) -> ExitCode {
    let repo = descriptor.name.clone();
    let result = engine.clone_repository(descriptor, credential).await;
    report(Operation::Clone, &repo, &result)
}

pub async fn run_purge<S: NoteStore + 'static>(engine: &AsyncSyncEngine<S>) -> ExitCode {
    let result = engine.purge().await;
    report(Operation::Purge, "", &result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitnotes_app::SyncError;

    #[test]
    fn success_line_names_the_repository() {
        let line = status_line(Operation::Push, "notes", &SyncResult::Success);
        assert_eq!(line, Ok("Successfully pushed 'notes' to its remote".to_owned()));
    }

    #[test]
    fn rejected_push_asks_for_force() {
        let result = SyncResult::force_required(SyncError::PushRejected(vec!["refs/heads/master".into()]));
        let Err(line) = status_line(Operation::Push, "notes", &result) else {
            panic!("rejection must not be reported as success");
        };
        assert!(line.contains("--force"));
    }

    #[test]
    fn failure_line_carries_the_cause() {
        let result = SyncResult::failed(SyncError::NoRemote("notes".into()));
        let Err(line) = status_line(Operation::Pull, "notes", &result) else {
            panic!("failure must not be reported as success");
        };
        assert_eq!(line, "Pull of 'notes' failed: Repository 'notes' has no remote configured");
    }

    #[test]
    fn failure_without_cause_is_still_reported() {
        let result = SyncResult::Failure {
            cause: None,
            needs_force: false,
        };
        assert_eq!(
            status_line(Operation::Clone, "notes", &result),
            Err("Clone of 'notes' failed: unknown error".to_owned())
        );
    }
}
