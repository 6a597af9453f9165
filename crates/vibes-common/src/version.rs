//! Wire versions of the JSON payloads exchanged through the room.
//!
//! A payload carries only its major number (`"v": 1`). Minor revisions add
//! optional fields, so any reader of the same major accepts them.

use serde::{Deserialize, Serialize};

/// Version of a payload schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Bumped when a field changes meaning or becomes required
    pub major: u16,
    /// Bumped when an optional field is added
    pub minor: u16,
}

impl SchemaVersion {
    /// Creates a schema version.
    #[must_use]
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Participant metadata. 1.1 added the music and party titles.
    pub const PARTICIPANT_METADATA: Self = Self::new(1, 1);

    /// Number written to the `v` field.
    #[must_use]
    pub const fn wire(self) -> u16 {
        self.major
    }

    /// Whether a payload tagged `v` can be read by this schema.
    #[must_use]
    pub const fn accepts(self, v: u16) -> bool {
        self.major == v
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
