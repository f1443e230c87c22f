//! Domain types and the note-file text format for gitnotes.

/// Identifier types.
pub mod id;
/// The note entity.
pub mod note;
/// Plain-text encoding of notes in a working tree.
pub mod note_file;
/// Repository descriptors, credentials and identities.
pub mod repository;

pub use id::NoteId;
pub use note::Note;
pub use note_file::NoteFileError;
pub use repository::{Credential, Identity, RepositoryDescriptor, is_path_safe_name, repository_name_from_url};
