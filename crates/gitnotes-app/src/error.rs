//! Errors raised by the note and credential stores.

use thiserror::Error;

/// Failure of a local collaborator store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file does not hold valid JSON.
    #[error("Malformed store file: {0}")]
    Json(#[from] serde_json::Error),

    /// A previous writer panicked while holding the store lock.
    #[error("Store lock poisoned")]
    Poisoned,
}
