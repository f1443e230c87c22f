#![allow(clippy::expect_used, clippy::unwrap_used)]

use anyhow::Result;
use git2::{Repository, RepositoryInitOptions, Signature};
use gitnotes_app::{MemoryNoteStore, NoteStore, SyncEngine, SyncError, SyncSettings};
use gitnotes_core::{Identity, Note, NoteId, RepositoryDescriptor};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn engine(root: &Path) -> SyncEngine {
    SyncEngine::new(SyncSettings::new(root).with_identity(Identity {
        name: "tester".into(),
        email: "tester@example.invalid".into(),
    }))
}

fn empty_remote(dir: &Path) -> Result<String> {
    let mut options = RepositoryInitOptions::new();
    options.bare(true).initial_head("master");
    Repository::init_opts(dir, &options)?;
    Ok(format!("file://{}", dir.display()))
}

fn descriptor(url: &str) -> RepositoryDescriptor {
    RepositoryDescriptor::new("tester", "notes", url)
}

fn note(id: u64, title: &str) -> Note {
    Note::new(title, format!("{title} body")).with_id(NoteId::new(id))
}

#[test]
fn fresh_push_then_independent_clone() -> Result<()> {
    let remote = TempDir::new()?;
    let url = empty_remote(remote.path())?;

    let alice_root = TempDir::new()?;
    let alice = engine(alice_root.path());
    let handle = alice.open_repository(&descriptor(&url))?;
    let written = note(1, "Groceries");
    assert!(alice.commit_notes(&handle, std::slice::from_ref(&written), None).is_success());
    let pushed = alice.verified_push(&handle, &url, None, false);
    assert!(pushed.is_success(), "push failed: {pushed:?}");

    let bob_root = TempDir::new()?;
    let bob = engine(bob_root.path());
    let store = MemoryNoteStore::with_notes([note(9, "stale")]);
    let cloned = bob.verified_clone(&descriptor(&url), &url, None, &store);
    assert!(cloned.is_success(), "clone failed: {cloned:?}");
    assert_eq!(store.list()?, vec![written]);
    Ok(())
}

#[test]
fn divergent_push_needs_force() -> Result<()> {
    let remote = TempDir::new()?;
    let url = empty_remote(remote.path())?;

    let alice_root = TempDir::new()?;
    let alice = engine(alice_root.path());
    let alice_store = MemoryNoteStore::new();
    assert!(alice.verified_clone(&descriptor(&url), &url, None, &alice_store).is_success());

    let bob_root = TempDir::new()?;
    let bob = engine(bob_root.path());
    let bob_store = MemoryNoteStore::new();
    assert!(bob.verified_clone(&descriptor(&url), &url, None, &bob_store).is_success());

    let alice_handle = alice.open_repository(&descriptor(&url))?;
    assert!(alice.commit_notes(&alice_handle, &[note(1, "alice")], None).is_success());
    assert!(alice.verified_push(&alice_handle, &url, None, false).is_success());

    let bob_handle = bob.open_repository(&descriptor(&url))?;
    let bobs = note(2, "bob");
    assert!(bob.commit_notes(&bob_handle, std::slice::from_ref(&bobs), None).is_success());
    let rejected = bob.verified_push(&bob_handle, &url, None, false);
    assert!(!rejected.is_success());
    assert!(rejected.needs_force(), "expected needs_force: {rejected:?}");
    assert!(matches!(rejected.cause(), Some(SyncError::PushRejected(_))));

    let forced = bob.verified_push(&bob_handle, &url, None, true);
    assert!(forced.is_success(), "forced push failed: {forced:?}");

    let pulled = alice.verified_pull(&alice_handle, &url, None, true, &alice_store);
    assert!(pulled.is_success(), "force pull failed: {pulled:?}");
    assert_eq!(alice_store.list()?, vec![bobs]);
    Ok(())
}

#[test]
fn pull_brings_in_remote_notes() -> Result<()> {
    let remote = TempDir::new()?;
    let url = empty_remote(remote.path())?;

    let alice_root = TempDir::new()?;
    let alice = engine(alice_root.path());
    let alice_handle = alice.open_repository(&descriptor(&url))?;
    let first = note(1, "first");
    assert!(alice.commit_notes(&alice_handle, std::slice::from_ref(&first), None).is_success());
    assert!(alice.verified_push(&alice_handle, &url, None, false).is_success());

    let bob_root = TempDir::new()?;
    let bob = engine(bob_root.path());
    let bob_store = MemoryNoteStore::new();
    assert!(bob.verified_clone(&descriptor(&url), &url, None, &bob_store).is_success());

    let second = note(2, "second");
    assert!(alice.commit_notes(&alice_handle, &[first.clone(), second.clone()], None).is_success());
    assert!(alice.verified_push(&alice_handle, &url, None, false).is_success());

    let bob_handle = bob.open_repository(&descriptor(&url))?;
    let pulled = bob.verified_pull(&bob_handle, &url, None, false, &bob_store);
    assert!(pulled.is_success(), "pull failed: {pulled:?}");
    assert_eq!(bob_store.list()?, vec![first, second]);
    Ok(())
}

#[test]
fn foreign_remote_is_refused_and_nothing_changes() -> Result<()> {
    let foreign_dir = TempDir::new()?;
    let foreign = Repository::init(foreign_dir.path())?;
    fs::write(foreign_dir.path().join("lib.rs"), "pub fn answer() -> u32 { 42 }\n")?;
    let mut index = foreign.index()?;
    index.add_path(Path::new("lib.rs"))?;
    index.write()?;
    let tree = foreign.find_tree(index.write_tree()?)?;
    let sig = Signature::now("someone", "someone@example.invalid")?;
    foreign.commit(Some("HEAD"), &sig, &sig, "code", &tree, &[])?;
    let url = format!("file://{}", foreign_dir.path().display());

    let root = TempDir::new()?;
    let engine = engine(root.path());
    let handle = engine.open_repository(&descriptor(""))?;
    let mine = note(1, "mine");
    let store = MemoryNoteStore::with_notes([mine.clone()]);
    assert!(engine.commit_store(&handle, &store, Some("local")).is_success());
    let head_before = Repository::open(handle.workdir())?.head()?.target();

    let pulled = engine.verified_pull(&handle, &url, None, false, &store);
    assert!(matches!(
        pulled.cause(),
        Some(SyncError::NotApplicationRepository { file, .. }) if file == "lib.rs"
    ));
    assert!(!pulled.needs_force());

    assert_eq!(store.list()?, vec![mine.clone()]);
    assert_eq!(handle.mapper().read()?, vec![mine]);
    assert_eq!(Repository::open(handle.workdir())?.head()?.target(), head_before);
    assert!(handle.remote_url().is_none(), "origin must not be configured");

    let pushed = engine.verified_push(&handle, &url, None, true);
    assert!(matches!(pushed.cause(), Some(SyncError::NotApplicationRepository { .. })));
    Ok(())
}

#[test]
fn clone_from_unreachable_remote_leaves_store_alone() -> Result<()> {
    let root = TempDir::new()?;
    let engine = engine(root.path());
    let store = MemoryNoteStore::with_notes([note(1, "keep")]);
    let url = format!("file://{}", root.path().join("nowhere.git").display());

    let cloned = engine.verified_clone(&descriptor(&url), &url, None, &store);
    assert!(matches!(cloned.cause(), Some(SyncError::Transport(_))));
    assert_eq!(store.list()?.len(), 1);
    assert!(!root.path().join("notes").exists());
    Ok(())
}

#[test]
fn cloned_repository_syncs_without_repeating_the_url() -> Result<()> {
    let remote = TempDir::new()?;
    let url = empty_remote(remote.path())?;

    let root = TempDir::new()?;
    let engine = engine(root.path());
    let store = MemoryNoteStore::new();
    assert!(engine.verified_clone(&descriptor(&url), &url, None, &store).is_success());

    let handle = engine.open_repository(&descriptor(""))?;
    assert_eq!(handle.remote_url().as_deref(), Some(url.as_str()));
    let written = note(1, "Groceries");
    assert!(engine.commit_notes(&handle, std::slice::from_ref(&written), None).is_success());
    let pushed = engine.verified_push(&handle, "", None, false);
    assert!(pushed.is_success(), "push failed: {pushed:?}");

    let pulled = engine.verified_pull(&handle, "  ", None, false, &store);
    assert!(pulled.is_success(), "pull failed: {pulled:?}");
    assert_eq!(store.list()?, vec![written]);
    Ok(())
}
