//! Remote participants known to the session.
//!
//! The host owns the roster and feeds it metadata payloads as they arrive.
//! A participant is present only while its latest payload validated: an
//! invalid update removes it rather than keeping a stale or partial entry.

use std::collections::BTreeMap;

use tracing::{debug, warn};
use vibes_common::{MetadataError, ParticipantId, ParticipantMetadata, Position};

/// A tracked remote participant.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantHandle {
    /// Stable identity for the session.
    pub identity: ParticipantId,
    /// Latest validated metadata.
    pub metadata: ParticipantMetadata,
}

impl ParticipantHandle {
    /// Create a handle.
    #[must_use]
    pub const fn new(identity: ParticipantId, metadata: ParticipantMetadata) -> Self {
        Self { identity, metadata }
    }

    /// Position on the map.
    #[must_use]
    pub const fn position(&self) -> Position {
        self.metadata.position
    }

    /// Whether the participant hosts a music party.
    #[must_use]
    pub const fn is_publishing_music(&self) -> bool {
        self.metadata.is_publishing_music
    }

    /// Display name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.metadata.username
    }
}

/// Identity to participant map.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    participants: BTreeMap<ParticipantId, ParticipantHandle>,
}

impl Roster {
    /// Create an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a metadata payload for `identity` and insert or update it.
    ///
    /// On a rejected payload the participant is removed and the error returned.
    pub fn apply_metadata(
        &mut self,
        identity: &ParticipantId,
        json: &str,
    ) -> Result<&ParticipantHandle, MetadataError> {
        match ParticipantMetadata::parse(json) {
            Ok(metadata) => Ok(self.upsert(identity.clone(), metadata)),
            Err(e) => {
                if self.participants.remove(identity).is_some() {
                    warn!(participant = %identity, "Dropped participant with invalid metadata: {e}");
                } else {
                    debug!(participant = %identity, "Ignored invalid metadata: {e}");
                }
                Err(e)
            },
        }
    }

    /// Insert or update a participant from already validated metadata.
    pub fn upsert(&mut self, identity: ParticipantId, metadata: ParticipantMetadata) -> &ParticipantHandle {
        let handle = self
            .participants
            .entry(identity.clone())
            .or_insert_with(|| ParticipantHandle::new(identity, metadata.clone()));
        handle.metadata = metadata;
        handle
    }

    /// Remove a participant.
    pub fn remove(&mut self, identity: &ParticipantId) -> Option<ParticipantHandle> {
        self.participants.remove(identity)
    }

    /// Look up a participant.
    #[must_use]
    pub fn get(&self, identity: &ParticipantId) -> Option<&ParticipantHandle> {
        self.participants.get(identity)
    }

    /// Whether a participant is present.
    #[must_use]
    pub fn contains(&self, identity: &ParticipantId) -> bool {
        self.participants.contains_key(identity)
    }

    /// Iterate in identity order.
    pub fn iter(&self) -> impl Iterator<Item = &ParticipantHandle> {
        self.participants.values()
    }

    /// Number of participants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// True if nobody is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
