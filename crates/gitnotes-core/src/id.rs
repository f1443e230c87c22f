use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, num::ParseIntError, str::FromStr};

/// Identifier of a note, assigned by the note store on first persist.
///
/// Zero is reserved for notes that have not been persisted yet.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct NoteId(pub u64);

impl NoteId {
    /// Placeholder id carried by notes that were never stored.
    pub const UNASSIGNED: Self = Self(0);

    /// Wrap a raw identifier.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Whether the store has assigned this id.
    #[must_use]
    pub const fn is_assigned(self) -> bool {
        self.0 != 0
    }

    /// Identifier following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for NoteId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

impl Serialize for NoteId {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for NoteId {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(d).map(Self)
    }
}
