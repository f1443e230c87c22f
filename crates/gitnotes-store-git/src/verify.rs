//! Checking that a remote holds nothing but note files before touching it.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use git2::build::RepoBuilder;
use gitnotes_core::note_file;
use tracing::{debug, info, warn};

use crate::error::GitStoreError;
use crate::transport::Transport;
use crate::worktree::is_metadata;

/// Why a file disqualifies a remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mismatch {
    /// The file name lacks the note extension.
    FileName,
    /// The first lines are not the note header.
    Header,
    /// Notes are never nested; a tracked directory means other content.
    Directory,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileName => f.write_str("not a note file name"),
            Self::Header => f.write_str("missing note header"),
            Self::Directory => f.write_str("unexpected directory"),
        }
    }
}

/// Result of inspecting a remote's tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Every file looks like a note. An empty remote conforms.
    Conforming {
        /// Number of note files found.
        note_files: usize,
    },
    /// At least one file is not a note.
    Foreign {
        /// First offending file.
        file: String,
        /// What was wrong with it.
        reason: Mismatch,
    },
}

impl Verification {
    /// Whether the remote may be synced with.
    #[must_use]
    pub const fn is_conforming(&self) -> bool {
        matches!(self, Self::Conforming { .. })
    }
}

/// Clones remotes into throwaway directories and checks their content.
#[derive(Debug, Clone)]
pub struct RemoteVerifier {
    scratch_root: PathBuf,
}

impl RemoteVerifier {
    /// Verifier creating scratch clones under `scratch_root`.
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            scratch_root: scratch_root.into(),
        }
    }

    /// Clone `url` into a fresh scratch directory and inspect its tree.
    ///
    /// The scratch directory is removed afterwards whatever the outcome; a failure to remove it
    /// is logged but does not change the result.
    ///
    /// # Errors
    /// Returns authentication or transport errors when the clone fails, and I/O errors when the
    /// scratch directory cannot be created or read.
    pub fn verify(&self, url: &str, transport: &Transport<'_>) -> Result<Verification, GitStoreError> {
        fs::create_dir_all(&self.scratch_root)?;
        let scratch = tempfile::Builder::new()
            .prefix("verify-")
            .tempdir_in(&self.scratch_root)?;
        debug!(url, scratch = %scratch.path().display(), "Cloning remote for verification");

        let outcome = RepoBuilder::new()
            .fetch_options(transport.fetch_options())
            .clone(url, scratch.path())
            .map_err(GitStoreError::from_transport)
            .and_then(|_repo| inspect_tree(scratch.path()));

        let scratch_path = scratch.path().to_path_buf();
        if let Err(err) = scratch.close() {
            warn!(scratch = %scratch_path.display(), error = %err, "Failed to remove verification clone");
        }

        match &outcome {
            Ok(Verification::Conforming { note_files }) => info!(url, note_files, "Remote verified"),
            Ok(Verification::Foreign { file, reason }) => {
                warn!(url, %file, %reason, "Remote holds non-note files");
            }
            Err(err) => warn!(url, error = %err, "Remote verification failed"),
        }
        outcome
    }
}

/// Inspect the top of `dir`, where a note repository keeps all of its files.
///
/// `.git*` entries are ignored. Any other directory disqualifies the tree: git only checks out
/// directories that hold tracked files, and note files are never nested.
///
/// # Errors
/// Returns an I/O error when the directory cannot be listed or a file cannot be opened.
pub fn inspect_tree(dir: &Path) -> Result<Verification, GitStoreError> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(fs::DirEntry::file_name);

    let mut note_files = 0;
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_metadata(&name) {
            continue;
        }
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            return Ok(Verification::Foreign {
                file: name,
                reason: Mismatch::Directory,
            });
        }
        if !file_type.is_file() {
            continue;
        }
        if !note_file::is_note_file_name(&name) {
            return Ok(Verification::Foreign {
                file: name,
                reason: Mismatch::FileName,
            });
        }
        if !has_header(&entry.path())? {
            return Ok(Verification::Foreign {
                file: name,
                reason: Mismatch::Header,
            });
        }
        note_files += 1;
    }
    Ok(Verification::Conforming { note_files })
}

/// Reads at most the header lines; content that is not UTF-8 fails the check.
fn has_header(path: &Path) -> Result<bool, GitStoreError> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::with_capacity(note_file::HEADER_PREFIXES.len());
    for line in reader.lines().take(note_file::HEADER_PREFIXES.len()) {
        match line {
            Ok(line) => lines.push(line),
            Err(err) if err.kind() == std::io::ErrorKind::InvalidData => return Ok(false),
            Err(err) => return Err(err.into()),
        }
    }
    Ok(note_file::has_note_header(lines.iter().map(String::as_str)))
}
