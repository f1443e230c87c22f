use crate::id::NoteId;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A single note as held by the note store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Store-assigned identifier.
    pub id: NoteId,
    /// Single-line title.
    pub title: String,
    /// Free-form body.
    pub body: String,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last modification time.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Note {
    /// Create an unsaved note stamped with the current time.
    #[must_use]
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: NoteId::UNASSIGNED,
            title: title.into(),
            body: body.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Return the same note carrying `id`.
    #[must_use]
    pub const fn with_id(mut self, id: NoteId) -> Self {
        self.id = id;
        self
    }
}

/// Current UTC time truncated to millisecond precision, the precision of the note file format.
#[must_use]
pub fn now_millis() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(now.nanosecond() / 1_000_000 * 1_000_000)
        .unwrap_or(now)
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn unix_millis(ts: OffsetDateTime) -> i64 {
    i64::try_from(ts.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

/// Inverse of [`unix_millis`]; `None` when out of range.
#[must_use]
pub fn from_unix_millis(millis: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}
