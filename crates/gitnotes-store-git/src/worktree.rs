//! Mapping between a note collection and the files of a working tree.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use gitnotes_core::{Note, note_file};
use tracing::{debug, warn};

use crate::error::GitStoreError;

/// Files written and deleted by [`WorkingTreeMapper::materialize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeChanges {
    /// Files created or rewritten.
    pub added: BTreeSet<String>,
    /// Files deleted.
    pub removed: BTreeSet<String>,
}

impl TreeChanges {
    /// True when the working tree was left untouched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Names starting with `.git` (the metadata directory, `.gitignore`, ...) never hold notes.
pub(crate) fn is_metadata(name: &str) -> bool {
    name.starts_with(".git")
}

/// Converts notes to files in one directory and back. Knows nothing about version control.
#[derive(Debug, Clone)]
pub struct WorkingTreeMapper {
    dir: PathBuf,
}

impl WorkingTreeMapper {
    /// Mapper over `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory being mapped.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Make the directory hold exactly one file per note.
    ///
    /// Files whose content is already current are left alone, so a second call with the same
    /// notes reports no changes. Every other regular, non-metadata file is deleted.
    ///
    /// # Errors
    /// Returns an I/O error when a file cannot be listed, written or deleted.
    pub fn materialize(&self, notes: &[Note]) -> Result<TreeChanges, GitStoreError> {
        let mut wanted = BTreeMap::new();
        for note in notes {
            let name = note_file::file_name(note);
            if wanted.insert(name.clone(), note_file::encode(note)).is_some() {
                debug!(file = %name, id = %note.id, "Duplicate note file name; last note wins");
            }
        }

        let mut changes = TreeChanges::default();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                debug!(path = %entry.path().display(), "Skipping non UTF-8 file name");
                continue;
            };
            if is_metadata(&name) || wanted.contains_key(&name) {
                continue;
            }
            fs::remove_file(entry.path())?;
            changes.removed.insert(name);
        }

        for (name, content) in wanted {
            let path = self.dir.join(&name);
            let current = match fs::read(&path) {
                Ok(bytes) => Some(bytes),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
                Err(err) => return Err(err.into()),
            };
            if current.as_deref() == Some(content.as_bytes()) {
                continue;
            }
            fs::write(&path, content)?;
            changes.added.insert(name);
        }

        debug!(
            dir = %self.dir.display(),
            added = changes.added.len(),
            removed = changes.removed.len(),
            "Materialized notes"
        );
        Ok(changes)
    }

    /// Parse every note file in the directory, sorted by id.
    ///
    /// Files that are not valid UTF-8 or lack required fields are skipped.
    ///
    /// # Errors
    /// Returns an I/O error when the directory cannot be listed.
    pub fn read(&self) -> Result<Vec<Note>, GitStoreError> {
        let mut notes = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            let is_note = entry
                .file_name()
                .to_str()
                .is_some_and(note_file::is_note_file_name);
            if !is_note {
                continue;
            }
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Skipping unreadable note file");
                    continue;
                }
            };
            match note_file::parse(&content) {
                Ok(note) => notes.push(note),
                Err(err) => debug!(path = %path.display(), error = %err, "Skipping malformed note file"),
            }
        }
        notes.sort_by_key(|note| note.id);
        Ok(notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitnotes_core::NoteId;
    use tempfile::TempDir;
    use time::macros::datetime;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn note(id: u64, title: &str) -> Note {
        Note {
            id: NoteId::new(id),
            title: title.into(),
            body: format!("body of {title}"),
            created_at: datetime!(2024-05-01 10:00:00.250 UTC),
            updated_at: datetime!(2024-05-02 11:30:00 UTC),
        }
    }

    fn mapper() -> Result<(TempDir, WorkingTreeMapper), std::io::Error> {
        let temp = TempDir::new()?;
        fs::create_dir(temp.path().join(".git"))?;
        let mapper = WorkingTreeMapper::new(temp.path());
        Ok((temp, mapper))
    }

    #[test]
    fn materialize_is_idempotent() -> TestResult {
        let (_temp, mapper) = mapper()?;
        let notes = vec![note(1, "first"), note(2, "second")];

        let first = mapper.materialize(&notes)?;
        assert_eq!(first.added.len(), 2);
        assert!(first.removed.is_empty());

        let second = mapper.materialize(&notes)?;
        assert!(second.is_empty(), "unexpected changes: {second:?}");
        Ok(())
    }

    #[test]
    fn read_round_trips_materialized_notes() -> TestResult {
        let (_temp, mapper) = mapper()?;
        let original = note(7, "Shopping list");
        mapper.materialize(std::slice::from_ref(&original))?;

        let notes = mapper.read()?;
        assert_eq!(notes, vec![original]);
        Ok(())
    }

    #[test]
    fn subset_removes_exactly_the_dropped_files() -> TestResult {
        let (temp, mapper) = mapper()?;
        let all: Vec<Note> = (1..=5).map(|id| note(id, &format!("note {id}"))).collect();
        mapper.materialize(&all)?;

        let keep = &all[..2];
        let kept_before: Vec<_> = keep
            .iter()
            .map(|n| fs::metadata(temp.path().join(note_file::file_name(n))).and_then(|m| m.modified()))
            .collect::<Result<_, _>>()?;

        let changes = mapper.materialize(keep)?;
        assert_eq!(changes.removed.len(), 3);
        assert!(changes.added.is_empty());

        let kept_after: Vec<_> = keep
            .iter()
            .map(|n| fs::metadata(temp.path().join(note_file::file_name(n))).and_then(|m| m.modified()))
            .collect::<Result<_, _>>()?;
        assert_eq!(kept_before, kept_after);
        Ok(())
    }

    #[test]
    fn empty_collection_leaves_only_metadata() -> TestResult {
        let (temp, mapper) = mapper()?;
        mapper.materialize(&[note(1, "a"), note(2, "b")])?;
        fs::write(temp.path().join(".gitignore"), "*.tmp\n")?;
        fs::write(temp.path().join("README.md"), "stray")?;

        let changes = mapper.materialize(&[])?;
        assert_eq!(changes.removed.len(), 3);

        let mut left: Vec<_> = fs::read_dir(temp.path())?
            .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<Result<_, _>>()?;
        left.sort();
        assert_eq!(left, vec![".git", ".gitignore"]);
        Ok(())
    }

    #[test]
    fn edited_note_is_rewritten_and_renamed_note_replaced() -> TestResult {
        let (_temp, mapper) = mapper()?;
        let mut a = note(1, "alpha");
        mapper.materialize(std::slice::from_ref(&a))?;

        a.body = "changed".into();
        let changes = mapper.materialize(std::slice::from_ref(&a))?;
        assert_eq!(changes.added.len(), 1);
        assert!(changes.removed.is_empty());

        a.title = "beta".into();
        let changes = mapper.materialize(std::slice::from_ref(&a))?;
        assert_eq!(changes.added.iter().collect::<Vec<_>>(), vec!["beta_1.txt"]);
        assert_eq!(changes.removed.iter().collect::<Vec<_>>(), vec!["alpha_1.txt"]);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn undeletable_file_is_an_error() -> TestResult {
        use std::os::unix::fs::PermissionsExt;

        let (temp, mapper) = mapper()?;
        mapper.materialize(&[note(1, "stuck")])?;
        fs::set_permissions(temp.path(), fs::Permissions::from_mode(0o555))?;

        // Permissions are not enforced for privileged users.
        let enforced = fs::write(temp.path().join("write-check"), "").is_err();
        let result = if enforced {
            Some(mapper.materialize(&[]))
        } else {
            fs::remove_file(temp.path().join("write-check"))?;
            None
        };
        fs::set_permissions(temp.path(), fs::Permissions::from_mode(0o755))?;

        if let Some(result) = result {
            assert!(matches!(result, Err(GitStoreError::IoError(_))), "got {result:?}");
            assert!(temp.path().join("stuck_1.txt").exists());
        }
        Ok(())
    }

    #[test]
    fn read_skips_malformed_and_foreign_files() -> TestResult {
        let (temp, mapper) = mapper()?;
        mapper.materialize(&[note(3, "good")])?;
        fs::write(temp.path().join("broken.txt"), "ID: x\nnothing else")?;
        fs::write(temp.path().join("notes.md"), "# not a note")?;
        fs::write(temp.path().join("binary.txt"), [0xff_u8, 0xfe, 0x00])?;
        fs::create_dir(temp.path().join("nested.txt"))?;

        let notes = mapper.read()?;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, NoteId::new(3));
        Ok(())
    }
}
