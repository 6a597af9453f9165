//! Track naming convention and track descriptors.
//!
//! Published audio tracks come in two classes distinguished only by name:
//! names starting with [`MUSIC_TRACK_PREFIX`] are music (explicitly joined,
//! flat volume), everything else is voice (proximity gated, spatialised).

use serde::{Deserialize, Serialize};

use crate::ids::{MediaStreamId, ParticipantId};

/// Name prefix that marks a music track.
pub const MUSIC_TRACK_PREFIX: &str = "music-";

/// Default music track name used by the publishing UI.
pub const DEFAULT_MUSIC_TRACK: &str = "music-default";

/// Class of a published audio track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    /// Microphone or any other non-music audio.
    Voice,
    /// Party music broadcast.
    Music,
}

/// Name of a published audio track.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackName(String);

impl TrackName {
    /// Creates a track name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Classifies the track by its name.
    #[must_use]
    pub fn kind(&self) -> TrackKind {
        if self.0.starts_with(MUSIC_TRACK_PREFIX) {
            TrackKind::Music
        } else {
            TrackKind::Voice
        }
    }

    /// Shorthand for `kind() == TrackKind::Music`.
    #[must_use]
    pub fn is_music(&self) -> bool {
        self.kind() == TrackKind::Music
    }
}

impl From<&str> for TrackName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl std::fmt::Display for TrackName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A published audio track as seen through the signaling layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackPublication {
    /// Track name.
    pub name: TrackName,
    /// Whether the local user is currently subscribed.
    pub subscribed: bool,
}

impl TrackPublication {
    /// Creates an unsubscribed publication.
    #[must_use]
    pub fn new(name: impl Into<TrackName>) -> Self {
        Self {
            name: name.into(),
            subscribed: false,
        }
    }

    /// Returns the track class.
    #[must_use]
    pub fn kind(&self) -> TrackKind {
        self.name.kind()
    }
}

/// A resolved remote audio subscription, ready to be routed into the audio graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAudioTrack {
    /// Publishing participant.
    pub participant: ParticipantId,
    /// Track name.
    pub name: TrackName,
    /// Media stream carrying the track.
    pub stream: MediaStreamId,
}

impl RemoteAudioTrack {
    /// Returns the track class.
    #[must_use]
    pub fn kind(&self) -> TrackKind {
        self.name.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_music_prefix_classification() {
        assert_eq!(TrackName::from("music-default").kind(), TrackKind::Music);
        assert_eq!(TrackName::from("music-party1").kind(), TrackKind::Music);
        assert_eq!(TrackName::from("mic").kind(), TrackKind::Voice);
        assert_eq!(TrackName::from("microphone").kind(), TrackKind::Voice);
        // Prefix match is exact and case-sensitive.
        assert_eq!(TrackName::from("Music-loud").kind(), TrackKind::Voice);
        assert_eq!(TrackName::from("musicfan").kind(), TrackKind::Voice);
    }

    #[test]
    fn test_publication_defaults() {
        let publication = TrackPublication::new("mic");
        assert!(!publication.subscribed);
        assert_eq!(publication.kind(), TrackKind::Voice);
    }
}
