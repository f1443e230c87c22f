//! Plain-text layout of one note inside a repository working tree.
//!
//! ```text
//! ID: 42
//! Created at: 1709214310123
//! Updated at: 1709214399000
//!
//! Title: Groceries
//!
//! Body: milk
//! eggs
//! ```
//!
//! Timestamps are milliseconds since the Unix epoch. The body runs to the end of the file.

use crate::id::NoteId;
use crate::note::{Note, from_unix_millis, unix_millis};
use thiserror::Error;

/// Extension shared by every note file.
pub const NOTE_FILE_EXTENSION: &str = ".txt";

const ID_PREFIX: &str = "ID: ";
const CREATED_PREFIX: &str = "Created at: ";
const UPDATED_PREFIX: &str = "Updated at: ";
const TITLE_PREFIX: &str = "Title: ";
const BODY_PREFIX: &str = "Body: ";

/// Header prefixes, in the order they must appear on the first three lines.
pub const HEADER_PREFIXES: [&str; 3] = [ID_PREFIX, CREATED_PREFIX, UPDATED_PREFIX];

/// Number of title characters that make it into a file name.
const SLUG_CHARS: usize = 20;

/// Reasons a note file cannot be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NoteFileError {
    /// A required line or section is absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A numeric field failed to parse.
    #[error("invalid value for {field}: {value:?}")]
    InvalidNumber {
        /// Field name.
        field: &'static str,
        /// Raw text found in the file.
        value: String,
    },

    /// A timestamp is outside the representable range.
    #[error("timestamp out of range for {0}")]
    TimestampOutOfRange(&'static str),
}

/// Deterministic file name for `note`: a slug of the title plus the id.
///
/// The id suffix keeps two notes with the same title prefix from sharing a file.
#[must_use]
pub fn file_name(note: &Note) -> String {
    let slug = slug(&note.title);
    if slug.is_empty() {
        format!("note_{}{NOTE_FILE_EXTENSION}", note.id)
    } else {
        format!("{slug}_{}{NOTE_FILE_EXTENSION}", note.id)
    }
}

fn slug(title: &str) -> String {
    let raw: String = title
        .chars()
        .take(SLUG_CHARS)
        .map(|c| {
            if c.is_whitespace() || c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') {
                '_'
            } else {
                c
            }
        })
        .collect();
    raw.trim_start_matches('.').to_owned()
}

/// Whether `name` follows the note-file naming convention.
#[must_use]
pub fn is_note_file_name(name: &str) -> bool {
    name.len() > NOTE_FILE_EXTENSION.len() && name.ends_with(NOTE_FILE_EXTENSION) && !name.starts_with('.')
}

/// Whether the first three lines carry the `ID:` / `Created at:` / `Updated at:` header.
pub fn has_note_header<'a>(mut lines: impl Iterator<Item = &'a str>) -> bool {
    HEADER_PREFIXES
        .iter()
        .all(|prefix| lines.next().is_some_and(|line| line.starts_with(prefix)))
}

/// Render `note` in the fixed text layout.
///
/// Line breaks inside the title are folded into spaces so the layout stays parseable.
#[must_use]
pub fn encode(note: &Note) -> String {
    let title = note.title.replace(['\r', '\n'], " ");
    format!(
        "{ID_PREFIX}{}\n{CREATED_PREFIX}{}\n{UPDATED_PREFIX}{}\n\n{TITLE_PREFIX}{title}\n\n{BODY_PREFIX}{}",
        note.id,
        unix_millis(note.created_at),
        unix_millis(note.updated_at),
        note.body,
    )
}

/// Decode a note file produced by [`encode`].
///
/// # Errors
/// Returns [`NoteFileError`] when the id, either timestamp, or the title line is missing or
/// malformed.
pub fn parse(content: &str) -> Result<Note, NoteFileError> {
    let (header, rest) = content
        .split_once("\n\n")
        .ok_or(NoteFileError::MissingField("title"))?;
    let mut lines = header.lines();

    let raw_id = header_field(lines.next(), ID_PREFIX, "id")?;
    let id = raw_id.parse::<NoteId>().map_err(|_| NoteFileError::InvalidNumber {
        field: "id",
        value: raw_id.to_owned(),
    })?;
    let created_at = timestamp(header_field(lines.next(), CREATED_PREFIX, "created at")?, "created at")?;
    let updated_at = timestamp(header_field(lines.next(), UPDATED_PREFIX, "updated at")?, "updated at")?;

    let rest = rest
        .strip_prefix(TITLE_PREFIX)
        .ok_or(NoteFileError::MissingField("title"))?;
    let (title, body) = match rest.split_once("\n\n") {
        Some((title, body)) => (title, body.strip_prefix(BODY_PREFIX).unwrap_or(body)),
        None => (rest.trim_end_matches('\n'), ""),
    };

    Ok(Note {
        id,
        title: title.to_owned(),
        body: body.to_owned(),
        created_at,
        updated_at,
    })
}

fn header_field<'a>(
    line: Option<&'a str>,
    prefix: &str,
    field: &'static str,
) -> Result<&'a str, NoteFileError> {
    line.and_then(|line| line.strip_prefix(prefix))
        .map(|value| value.trim_end_matches('\r'))
        .ok_or(NoteFileError::MissingField(field))
}

fn timestamp(raw: &str, field: &'static str) -> Result<time::OffsetDateTime, NoteFileError> {
    let millis = raw.trim().parse::<i64>().map_err(|_| NoteFileError::InvalidNumber {
        field,
        value: raw.to_owned(),
    })?;
    from_unix_millis(millis).ok_or(NoteFileError::TimestampOutOfRange(field))
}
