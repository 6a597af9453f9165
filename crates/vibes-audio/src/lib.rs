//! # Vibes Audio
//!
//! Spatial audio for map-based voice rooms.
//!
//! This crate provides:
//! - Geographic projection of participant positions into listener space
//! - Panner parameters and distance attenuation models
//! - The audio platform abstraction and an in-memory backend
//! - Resource lifecycle tracking for elements, tracks, streams and object URLs
//! - Autoplay gesture handling
//! - The per-session spatial audio graph
//!
//! ## Architecture
//!
//! The graph owns its backend. Nothing here is global: each room session
//! builds one [`SpatialAudioGraph`] and destroys it on disconnect.
//!
//! ## Coordinates
//!
//! Participants report positions on the map. [`ProjectionMode`] turns the
//! difference between the local and a remote position into a meter offset,
//! which becomes the panner position while the listener stays at the origin.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod backend;
pub mod gesture;
pub mod graph;
pub mod headless;
pub mod panner;
pub mod projection;
pub mod resource;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::backend::*;
    pub use crate::gesture::*;
    pub use crate::graph::*;
    pub use crate::headless::*;
    pub use crate::panner::*;
    pub use crate::projection::*;
    pub use crate::resource::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use vibes_common::{MediaStreamId, ParticipantId, Position, RemoteAudioTrack, TrackName};

    #[test]
    fn test_panner_gain_follows_projection() {
        let mut graph = SpatialAudioGraph::new(HeadlessBackend::new(), SpatialConfig::default());
        assert!(graph.initialize());

        let track = RemoteAudioTrack {
            participant: ParticipantId::new("ana"),
            name: TrackName::new("voice"),
            stream: MediaStreamId::new(1),
        };
        // ~33 m east at the equator.
        assert!(graph.add_source(&track, Position::new(0.0, 0.0003)));

        let panner = graph.source(&track.participant).expect("source").panner_node;
        let gain = graph.backend().panner_gain(panner).expect("panner gain");
        let expected = PannerParams::default().gain_at(33.36);
        assert!((gain - expected).abs() < 1e-4);
    }
}
