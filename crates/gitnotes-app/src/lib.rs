//! Application layer for gitnotes.
//!
//! This crate provides the sync engine and its uniform result type, the note and credential
//! store interfaces with their in-memory and file implementations, commit identity resolution,
//! configuration, and an async wrapper for running operations off the caller's executor.

pub mod async_engine;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod identity;
pub mod note_store;
pub mod phase;
pub mod result;

// Re-exports for convenience
pub use async_engine::AsyncSyncEngine;
pub use config::{AppConfig, RepositoryConfig, StorageConfig, SyncConfig};
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use engine::{SyncEngine, SyncSettings};
pub use error::StoreError;
pub use identity::resolve_identity;
pub use note_store::{JsonNoteStore, MemoryNoteStore, NoteStore};
pub use phase::{SyncAttempt, SyncPhase};
pub use result::{SyncError, SyncResult};
