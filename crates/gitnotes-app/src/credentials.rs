//! Single-slot credential storage: logging in replaces whatever was stored before.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use gitnotes_core::Credential;
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::StoreError;

/// File name of [`FileCredentialStore`] under the storage root.
pub const CREDENTIALS_FILE: &str = "credentials.json";

/// Holds at most one profile/token pair.
pub trait CredentialStore: Send + Sync {
    /// The stored credential, or `None` when nothing usable is stored (including an empty token).
    ///
    /// # Errors
    /// Returns a store-specific error when the slot cannot be read.
    fn get_credentials(&self) -> Result<Option<Credential>, StoreError>;

    /// Replace the stored credential.
    ///
    /// # Errors
    /// Returns a store-specific error when the slot cannot be written.
    fn replace(&self, credential: Credential) -> Result<(), StoreError>;
}

/// Credential slot in memory.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<Credential>>,
}

impl CredentialStore for MemoryCredentialStore {
    fn get_credentials(&self) -> Result<Option<Credential>, StoreError> {
        let slot = self.slot.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(slot.clone().filter(Credential::is_usable))
    }

    fn replace(&self, credential: Credential) -> Result<(), StoreError> {
        let mut slot = self.slot.lock().map_err(|_| StoreError::Poisoned)?;
        *slot = Some(credential);
        Ok(())
    }
}

/// Credential slot persisted as JSON, readable by the owner only.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Store backed by `<root>/credentials.json`.
    pub fn open(root: impl AsRef<Path>) -> Self {
        Self {
            path: root.as_ref().join(CREDENTIALS_FILE),
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn get_credentials(&self) -> Result<Option<Credential>, StoreError> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let credential: Credential = serde_json::from_slice(&contents)?;
        Ok(Some(credential).filter(Credential::is_usable))
    }

    fn replace(&self, credential: Credential) -> Result<(), StoreError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        // Temporary files are created with mode 0600 on unix, and persist keeps the mode.
        let mut file = NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut file, &credential)?;
        file.write_all(b"\n")?;
        file.persist(&self.path).map_err(|err| StoreError::Io(err.error))?;
        info!(profile = %credential.username, "Stored credentials");
        Ok(())
    }
}
