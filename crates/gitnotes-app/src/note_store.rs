//! The note store the sync engine reads snapshots from and repopulates after a pull.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use gitnotes_core::{Note, NoteId};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StoreError;

/// File name of [`JsonNoteStore`] under the storage root.
pub const NOTES_FILE: &str = "notes.json";

/// Minimal note storage required by [`crate::SyncEngine`].
///
/// Methods take `&self`; implementations synchronise internally so one store can be shared by
/// concurrent sync workers.
pub trait NoteStore: Send + Sync {
    /// Snapshot of every note, ordered by id.
    ///
    /// # Errors
    /// Returns a store-specific error when the notes cannot be read.
    fn list(&self) -> Result<Vec<Note>, StoreError>;

    /// Persist `note` and return its id.
    ///
    /// An assigned id that is still free is kept; otherwise the next id after the largest one in
    /// use is assigned.
    ///
    /// # Errors
    /// Returns a store-specific error when the note cannot be written.
    fn insert(&self, note: Note) -> Result<NoteId, StoreError>;

    /// Remove the note with `id`. Returns whether it existed.
    ///
    /// # Errors
    /// Returns a store-specific error when the store cannot be updated.
    fn delete(&self, id: NoteId) -> Result<bool, StoreError>;

    /// Replace the whole collection with `notes`.
    ///
    /// The default deletes every note and inserts the new ones one by one.
    ///
    /// # Errors
    /// Propagates the first error from the underlying store.
    fn replace_all(&self, notes: Vec<Note>) -> Result<(), StoreError> {
        for note in self.list()? {
            self.delete(note.id)?;
        }
        for note in notes {
            self.insert(note)?;
        }
        Ok(())
    }
}

fn insert_into(notes: &mut Vec<Note>, mut note: Note) -> NoteId {
    let taken = |id: NoteId| notes.iter().any(|existing| existing.id == id);
    if !note.id.is_assigned() || taken(note.id) {
        let max = notes.iter().map(|existing| existing.id).max().unwrap_or(NoteId::UNASSIGNED);
        note.id = max.next();
    }
    let id = note.id;
    let at = notes.partition_point(|existing| existing.id < id);
    notes.insert(at, note);
    id
}

fn remove_from(notes: &mut Vec<Note>, id: NoteId) -> bool {
    let before = notes.len();
    notes.retain(|note| note.id != id);
    notes.len() != before
}

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryNoteStore {
    notes: Mutex<Vec<Note>>,
}

impl MemoryNoteStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with `notes`, keeping their ids where possible.
    #[must_use]
    pub fn with_notes(notes: impl IntoIterator<Item = Note>) -> Self {
        let mut inner = Vec::new();
        for note in notes {
            insert_into(&mut inner, note);
        }
        Self {
            notes: Mutex::new(inner),
        }
    }
}

impl NoteStore for MemoryNoteStore {
    fn list(&self) -> Result<Vec<Note>, StoreError> {
        let notes = self.notes.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(notes.clone())
    }

    fn insert(&self, note: Note) -> Result<NoteId, StoreError> {
        let mut notes = self.notes.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(insert_into(&mut notes, note))
    }

    fn delete(&self, id: NoteId) -> Result<bool, StoreError> {
        let mut notes = self.notes.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(remove_from(&mut notes, id))
    }

    fn replace_all(&self, notes: Vec<Note>) -> Result<(), StoreError> {
        let mut current = self.notes.lock().map_err(|_| StoreError::Poisoned)?;
        current.clear();
        for note in notes {
            insert_into(&mut current, note);
        }
        Ok(())
    }
}

/// Notes kept as a JSON array in one file, rewritten atomically on every change.
#[derive(Debug)]
pub struct JsonNoteStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonNoteStore {
    /// Store backed by `<root>/notes.json`. The file is created on first write.
    pub fn open(root: impl AsRef<Path>) -> Self {
        Self {
            path: root.as_ref().join(NOTES_FILE),
            lock: Mutex::new(()),
        }
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<Note>, StoreError> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut notes: Vec<Note> = serde_json::from_slice(&contents)?;
        notes.sort_by_key(|note| note.id);
        Ok(notes)
    }

    fn save(&self, notes: &[Note]) -> Result<(), StoreError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let mut file = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, notes)?;
        file.write_all(b"\n")?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|err| StoreError::Io(err.error))?;
        debug!(path = %self.path.display(), notes = notes.len(), "Saved note store");
        Ok(())
    }

    fn update<T>(&self, apply: impl FnOnce(&mut Vec<Note>) -> T) -> Result<T, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut notes = self.load()?;
        let out = apply(&mut notes);
        self.save(&notes)?;
        Ok(out)
    }
}

impl NoteStore for JsonNoteStore {
    fn list(&self) -> Result<Vec<Note>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        self.load()
    }

    fn insert(&self, note: Note) -> Result<NoteId, StoreError> {
        self.update(|notes| insert_into(notes, note))
    }

    fn delete(&self, id: NoteId) -> Result<bool, StoreError> {
        self.update(|notes| remove_from(notes, id))
    }

    fn replace_all(&self, notes: Vec<Note>) -> Result<(), StoreError> {
        self.update(|current| {
            current.clear();
            for note in notes {
                insert_into(current, note);
            }
        })
    }
}
