//! Participant metadata payloads.
//!
//! Each participant publishes a JSON blob through the signaling layer:
//!
//! ```json
//! {"v":1,"username":"ana","avatar":"fox","position":{"x":48.85,"y":2.35},
//!  "isPublishingMusic":true,"partyTitle":"Rooftop"}
//! ```
//!
//! Parsing is all-or-nothing. A payload without a usable position is rejected
//! so that a participant is never tracked with a garbage location.

use serde::{Deserialize, Serialize};

use crate::coords::Position;
use crate::error::MetadataError;
use crate::version::SchemaVersion;

const fn default_version() -> u16 {
    SchemaVersion::PARTICIPANT_METADATA.wire()
}

/// Validated participant metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantMetadata {
    /// Schema major version.
    #[serde(default = "default_version")]
    pub v: u16,
    /// Display name.
    #[serde(default)]
    pub username: String,
    /// Avatar key.
    #[serde(default)]
    pub avatar: String,
    /// Position on the map.
    pub position: Position,
    /// Whether the participant broadcasts a music party.
    #[serde(default)]
    pub is_publishing_music: bool,
    /// Title of the track being broadcast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_title: Option<String>,
    /// Description of the track being broadcast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_description: Option<String>,
    /// Party title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party_title: Option<String>,
    /// Party description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party_description: Option<String>,
}

#[derive(Deserialize)]
struct RawPosition {
    x: Option<f64>,
    y: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    #[serde(default = "default_version")]
    v: u16,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    position: Option<RawPosition>,
    #[serde(default)]
    is_publishing_music: Option<bool>,
    #[serde(default)]
    music_title: Option<String>,
    #[serde(default)]
    music_description: Option<String>,
    #[serde(default)]
    party_title: Option<String>,
    #[serde(default)]
    party_description: Option<String>,
}

impl ParticipantMetadata {
    /// Creates metadata for a participant at a position.
    #[must_use]
    pub fn new(username: impl Into<String>, position: Position) -> Self {
        Self {
            v: default_version(),
            username: username.into(),
            avatar: String::new(),
            position,
            is_publishing_music: false,
            music_title: None,
            music_description: None,
            party_title: None,
            party_description: None,
        }
    }

    /// Marks the participant as publishing a music party.
    #[must_use]
    pub fn with_party(mut self, title: impl Into<String>) -> Self {
        self.is_publishing_music = true;
        self.party_title = Some(title.into());
        self
    }

    /// Sets the avatar key.
    #[must_use]
    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = avatar.into();
        self
    }

    /// Parses and validates a metadata payload.
    pub fn parse(json: &str) -> Result<Self, MetadataError> {
        let raw: RawMetadata = serde_json::from_str(json)?;

        if !SchemaVersion::PARTICIPANT_METADATA.accepts(raw.v) {
            return Err(MetadataError::UnsupportedVersion(raw.v));
        }

        let position = match raw.position {
            Some(RawPosition {
                x: Some(x),
                y: Some(y),
            }) => Position::new(x, y),
            _ => return Err(MetadataError::MissingPosition),
        };
        if !position.is_finite() {
            return Err(MetadataError::InvalidPosition);
        }

        Ok(Self {
            v: raw.v,
            username: raw.username.unwrap_or_default(),
            avatar: raw.avatar.unwrap_or_default(),
            position,
            is_publishing_music: raw.is_publishing_music.unwrap_or(false),
            music_title: raw.music_title,
            music_description: raw.music_description,
            party_title: raw.party_title,
            party_description: raw.party_description,
        })
    }

    /// Serializes the metadata for publishing.
    pub fn to_json(&self) -> Result<String, MetadataError> {
        Ok(serde_json::to_string(self)?)
    }
}
