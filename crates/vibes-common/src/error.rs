//! Error types shared across the spatial audio crates.

use thiserror::Error;

use crate::ids::ParticipantId;
use crate::track::TrackName;

/// Top-level error type for spatial audio operations.
#[derive(Debug, Error)]
pub enum VibesError {
    /// Participant metadata errors
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// Moderation payload errors
    #[error("Moderation error: {0}")]
    Moderation(#[from] ModerationError),

    /// Signaling/subscription errors
    #[error("Signaling error: {0}")]
    Signaling(#[from] SignalingError),
}

/// Participant metadata validation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Payload is not valid JSON or has the wrong shape
    #[error("Malformed metadata: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Payload has no position
    #[error("Metadata has no position")]
    MissingPosition,

    /// Position contains NaN or infinite values
    #[error("Metadata position is not finite")]
    InvalidPosition,

    /// Payload was produced by an incompatible schema
    #[error("Unsupported metadata version {0}")]
    UnsupportedVersion(u16),
}

/// Moderation notice parsing errors.
#[derive(Debug, Error)]
pub enum ModerationError {
    /// Payload is not valid JSON or has the wrong shape
    #[error("Malformed moderation notice: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Notice type is not a moderation notice
    #[error("Unknown moderation notice type '{0}'")]
    UnknownType(String),
}

/// Errors reported by the signaling layer when (un)subscribing tracks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalingError {
    /// Participant is not in the room
    #[error("Participant '{0}' not present")]
    ParticipantNotFound(ParticipantId),

    /// Participant does not publish the requested track
    #[error("Track '{track}' not published by '{participant}'")]
    TrackNotFound {
        /// Publishing participant
        participant: ParticipantId,
        /// Requested track
        track: TrackName,
    },

    /// Transient network or SFU failure; worth retrying
    #[error("Transient signaling failure: {0}")]
    Transient(String),

    /// Room connection is gone
    #[error("Not connected to a room")]
    NotConnected,
}

impl SignalingError {
    /// Returns true if retrying the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Result type alias for spatial audio operations.
pub type VibesResult<T> = Result<T, VibesError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ParticipantMetadata;

    fn parse_username(json: &str) -> VibesResult<String> {
        Ok(ParticipantMetadata::parse(json)?.username)
    }

    #[test]
    fn test_metadata_error_converts() {
        assert_eq!(
            parse_username(r#"{"username":"ana","position":{"x":0.0,"y":0.0}}"#).expect("valid"),
            "ana"
        );
        let err = parse_username(r#"{"username":"ana"}"#).expect_err("no position");
        assert!(matches!(err, VibesError::Metadata(MetadataError::MissingPosition)));
        assert_eq!(err.to_string(), "Metadata error: Metadata has no position");
    }
}
