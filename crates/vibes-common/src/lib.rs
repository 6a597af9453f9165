//! # Vibes Common
//!
//! Common types shared by the Vibes Hunters spatial audio crates.
//!
//! This crate provides:
//! - Positions (geographic or planar)
//! - Participant and media stream IDs
//! - Track naming convention (voice vs. music)
//! - Versioned, validated participant metadata
//! - Moderation notice payloads
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod coords;
pub mod error;
pub mod ids;
pub mod metadata;
pub mod moderation;
pub mod track;
pub mod version;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::coords::*;
    pub use crate::error::*;
    pub use crate::ids::*;
    pub use crate::metadata::*;
    pub use crate::moderation::*;
    pub use crate::track::*;
    pub use crate::version::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_round_trips_current_version() {
        let metadata = ParticipantMetadata::new("ana", Position::new(48.85, 2.35));
        let json = metadata.to_json().expect("serialize");
        assert!(json.contains(r#""v":1"#));
        assert_eq!(ParticipantMetadata::parse(&json).expect("parse"), metadata);
    }

    #[test]
    fn test_signaling_error_retryable() {
        assert!(SignalingError::Transient("ice".into()).is_retryable());
        assert!(!SignalingError::NotConnected.is_retryable());
        assert!(!SignalingError::ParticipantNotFound("p".into()).is_retryable());
    }
}
