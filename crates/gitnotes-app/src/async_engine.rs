//! Async front for [`SyncEngine`] used by async callers.
//!
//! Each operation is submitted to tokio's blocking pool. Operations on the same repository run
//! one at a time, and a semaphore bounds how many run at once overall. Purge waits for every
//! in-flight operation and holds off new ones until it is done.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use gitnotes_core::{Credential, RepositoryDescriptor};
use gitnotes_store_git::RepositoryHandle;
use tokio::sync::{Mutex as AsyncMutex, RwLock, Semaphore};

use crate::engine::SyncEngine;
use crate::note_store::NoteStore;
use crate::result::{SyncError, SyncResult};

type RepositoryLocks = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Runs [`SyncEngine`] operations off the async executor.
pub struct AsyncSyncEngine<S> {
    engine: Arc<SyncEngine>,
    store: Arc<S>,
    permits: Arc<Semaphore>,
    repositories: Arc<RepositoryLocks>,
    purge_gate: RwLock<()>,
}

impl<S: NoteStore + 'static> AsyncSyncEngine<S> {
    /// Wrap `engine` and `store`, running at most `workers` operations concurrently.
    pub fn new(engine: SyncEngine, store: S, workers: usize) -> Self {
        Self {
            engine: Arc::new(engine),
            store: Arc::new(store),
            permits: Arc::new(Semaphore::new(workers.max(1))),
            repositories: Arc::default(),
            purge_gate: RwLock::new(()),
        }
    }

    /// Shared note store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Underlying blocking engine.
    #[must_use]
    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Commit the current contents of the note store into `descriptor`'s repository.
    pub async fn commit(&self, descriptor: RepositoryDescriptor, message: Option<String>) -> SyncResult {
        self.run(descriptor, move |engine, store, descriptor| {
            with_handle(engine, descriptor, |handle| {
                engine.commit_store(handle, store, message.as_deref())
            })
        })
        .await
    }

    /// Verified push to the descriptor's remote.
    pub async fn push(
        &self,
        descriptor: RepositoryDescriptor,
        credential: Option<Credential>,
        force: bool,
    ) -> SyncResult {
        self.run(descriptor, move |engine, _store, descriptor| {
            with_handle(engine, descriptor, |handle| {
                engine.verified_push(handle, &descriptor.remote_url, credential.as_ref(), force)
            })
        })
        .await
    }

    /// Verified pull from the descriptor's remote, reloading the note store.
    pub async fn pull(
        &self,
        descriptor: RepositoryDescriptor,
        credential: Option<Credential>,
        force: bool,
    ) -> SyncResult {
        self.run(descriptor, move |engine, store, descriptor| {
            with_handle(engine, descriptor, |handle| {
                engine.verified_pull(handle, &descriptor.remote_url, credential.as_ref(), force, store)
            })
        })
        .await
    }

    /// Verified clone of the descriptor's remote into a new local repository.
    pub async fn clone_repository(
        &self,
        descriptor: RepositoryDescriptor,
        credential: Option<Credential>,
    ) -> SyncResult {
        self.run(descriptor, move |engine, store, descriptor| {
            engine.verified_clone(descriptor, &descriptor.remote_url, credential.as_ref(), store)
        })
        .await
    }

    /// Delete every local repository once no other operation is running.
    pub async fn purge(&self) -> SyncResult {
        let _exclusive = self.purge_gate.write().await;
        let Ok(_permit) = self.permits.acquire().await else {
            return SyncResult::failed(pool_closed());
        };
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || engine.purge())
            .await
            .unwrap_or_else(|err| SyncResult::failed(SyncError::Background(err.to_string())))
    }

    async fn run<F>(&self, descriptor: RepositoryDescriptor, job: F) -> SyncResult
    where
        F: FnOnce(&SyncEngine, &S, &RepositoryDescriptor) -> SyncResult + Send + 'static,
    {
        let _shared = self.purge_gate.read().await;
        let lock = self.repository_lock(&descriptor.name);
        let _serial = lock.lock().await;
        let Ok(_permit) = self.permits.acquire().await else {
            return SyncResult::failed(pool_closed());
        };

        let engine = Arc::clone(&self.engine);
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || job(&*engine, &*store, &descriptor))
            .await
            .unwrap_or_else(|err| SyncResult::failed(SyncError::Background(err.to_string())))
    }

    fn repository_lock(&self, name: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(name.trim().to_owned()).or_default())
    }
}

fn with_handle(
    engine: &SyncEngine,
    descriptor: &RepositoryDescriptor,
    op: impl FnOnce(&RepositoryHandle) -> SyncResult,
) -> SyncResult {
    match engine.open_repository(descriptor) {
        Ok(handle) => op(&handle),
        Err(err) => SyncResult::failed(err),
    }
}

fn pool_closed() -> SyncError {
    SyncError::Background("worker pool closed".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SyncSettings;
    use crate::note_store::MemoryNoteStore;
    use anyhow::Result;
    use gitnotes_core::{Identity, Note};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    fn async_engine(root: &std::path::Path, workers: usize) -> AsyncSyncEngine<MemoryNoteStore> {
        let settings = SyncSettings::new(root).with_identity(Identity {
            name: "tester".into(),
            email: "tester@example.invalid".into(),
        });
        AsyncSyncEngine::new(SyncEngine::new(settings), MemoryNoteStore::new(), workers)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_commits_to_distinct_repositories_succeed() -> Result<()> {
        let temp = TempDir::new()?;
        let engine = Arc::new(async_engine(temp.path(), 2));
        engine.store().insert(Note::new("shared", "note"))?;

        let mut tasks = Vec::new();
        for idx in 0..4 {
            let engine = Arc::clone(&engine);
            tasks.push(tokio::spawn(async move {
                let descriptor = RepositoryDescriptor::new("me", format!("repo-{idx}"), "");
                engine.commit(descriptor, None).await
            }));
        }
        for task in tasks {
            assert!(task.await?.is_success());
        }
        for idx in 0..4 {
            assert!(temp.path().join(format!("repo-{idx}/.git")).is_dir());
        }
        Ok(())
    }

    #[tokio::test]
    async fn push_without_remote_reports_failure() -> Result<()> {
        let temp = TempDir::new()?;
        let engine = async_engine(temp.path(), 1);
        let result = engine
            .push(RepositoryDescriptor::new("me", "notes", ""), None, false)
            .await;
        assert!(matches!(result.cause(), Some(SyncError::NoRemote(_))));
        Ok(())
    }

    #[tokio::test]
    async fn purge_runs_on_the_blocking_pool() -> Result<()> {
        let temp = TempDir::new()?;
        let engine = async_engine(temp.path(), 1);
        assert!(engine.commit(RepositoryDescriptor::new("me", "notes", ""), None).await.is_success());
        assert!(engine.purge().await.is_success());
        assert!(!temp.path().join("notes").exists());
        Ok(())
    }

    #[tokio::test]
    async fn purge_waits_for_running_operations() -> Result<()> {
        let temp = TempDir::new()?;
        let engine = async_engine(temp.path(), 2);
        assert!(engine.commit(RepositoryDescriptor::new("me", "notes", ""), None).await.is_success());

        let running = engine.purge_gate.read().await;
        assert!(timeout(Duration::from_millis(50), engine.purge()).await.is_err());
        assert!(temp.path().join("notes/.git").is_dir());

        drop(running);
        assert!(engine.purge().await.is_success());
        assert!(!temp.path().join("notes").exists());
        Ok(())
    }
}
