//! Out-of-band moderation notices.
//!
//! Moderators act on published tracks from the admin dashboard. The affected
//! clients receive a data message such as
//! `{"type":"admin_track_unpublished","participantIdentity":"dj","trackName":"music-default"}`
//! and must treat it as an authoritative command.

use serde::{Deserialize, Serialize};

use crate::error::ModerationError;
use crate::ids::ParticipantId;
use crate::track::TrackName;

/// Wire tag for a forced mute.
pub const TRACK_MUTED_TAG: &str = "admin_track_muted";

/// Wire tag for a forced unpublish.
pub const TRACK_UNPUBLISHED_TAG: &str = "admin_track_unpublished";

/// What the moderator did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModerationKind {
    /// Track was muted by a moderator.
    TrackMuted,
    /// Track was unpublished by a moderator.
    TrackUnpublished,
}

impl ModerationKind {
    /// Returns the wire tag.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::TrackMuted => TRACK_MUTED_TAG,
            Self::TrackUnpublished => TRACK_UNPUBLISHED_TAG,
        }
    }

    /// Returns display text for the host UI.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::TrackMuted => "muted by a moderator",
            Self::TrackUnpublished => "stopped by a moderator",
        }
    }
}

/// A moderation notice targeting a participant and optionally one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationNotice {
    /// What happened.
    pub kind: ModerationKind,
    /// Participant whose track was affected.
    pub participant: ParticipantId,
    /// Affected track; `None` means every track of the participant.
    pub track: Option<TrackName>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNotice {
    #[serde(rename = "type")]
    kind: String,
    participant_identity: String,
    #[serde(default)]
    track_name: Option<String>,
}

impl ModerationNotice {
    /// Creates a notice.
    #[must_use]
    pub fn new(kind: ModerationKind, participant: ParticipantId, track: Option<TrackName>) -> Self {
        Self {
            kind,
            participant,
            track,
        }
    }

    /// Parses a data message into a notice.
    pub fn parse(json: &str) -> Result<Self, ModerationError> {
        let raw: RawNotice = serde_json::from_str(json)?;
        let kind = match raw.kind.as_str() {
            TRACK_MUTED_TAG => ModerationKind::TrackMuted,
            TRACK_UNPUBLISHED_TAG => ModerationKind::TrackUnpublished,
            _ => return Err(ModerationError::UnknownType(raw.kind)),
        };
        Ok(Self {
            kind,
            participant: ParticipantId::new(raw.participant_identity),
            track: raw.track_name.filter(|t| !t.is_empty()).map(TrackName::new),
        })
    }

    /// Returns true if the notice covers the given track of the given participant.
    #[must_use]
    pub fn targets(&self, participant: &ParticipantId, track: &TrackName) -> bool {
        &self.participant == participant && self.track.as_ref().map_or(true, |t| t == track)
    }
}
