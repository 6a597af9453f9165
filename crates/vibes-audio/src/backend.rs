//! Audio platform abstraction.
//!
//! The spatial graph never talks to a concrete audio API. Everything it needs
//! from the platform (a processing context, gain/panner/stream-source nodes,
//! playback elements, and the release primitives for tracks, streams and
//! object URLs) goes through [`AudioBackend`].
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     SpatialAudioGraph                        │
//! │   per participant:  source ─▶ gain ─▶ panner ─▶ master ─▶ out │
//! │                     backing element (muted, inline)          │
//! │   per party:        music element (full volume, non-spatial) │
//! └───────────────────────────────┬──────────────────────────────┘
//!                                 │ AudioBackend + ResourceReleaser
//!                 ┌───────────────┴───────────────┐
//!                 │  HeadlessBackend │ platform   │
//!                 └───────────────────────────────┘
//! ```

use glam::Vec3;
use thiserror::Error;
use vibes_common::MediaStreamId;

use crate::panner::PannerParams;

/// Audio backend error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    /// Processing context could not be created or resumed.
    #[error("Audio context unavailable: {0}")]
    ContextUnavailable(String),

    /// Operation requires an initialized graph.
    #[error("Audio graph not initialized")]
    NotInitialized,

    /// Node handle does not exist.
    #[error("Audio node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// Element handle does not exist.
    #[error("Playback element not found: {0:?}")]
    ElementNotFound(ElementId),

    /// Any other platform failure.
    #[error("Audio backend error: {0}")]
    Backend(String),
}

/// Result type for audio operations.
pub type AudioResult<T> = Result<T, AudioError>;

/// Why `play()` did not start playback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// Platform autoplay policy requires a user gesture first.
    #[error("Playback blocked until the next user gesture")]
    AutoplayBlocked,

    /// Element failed for another reason.
    #[error(transparent)]
    Element(#[from] AudioError),
}

/// Audio graph node handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Create a node handle from a raw ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID.
    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

/// Playback element handle (the `<audio>` equivalent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(u64);

impl ElementId {
    /// Create an element handle from a raw ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID.
    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

/// Locally published track handle (captured file or tab audio).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalTrackId(u64);

impl LocalTrackId {
    /// Create a track handle from a raw ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID.
    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

/// Processing context state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Created but not rendering (autoplay policy or explicit suspend).
    Suspended,
    /// Rendering.
    Running,
    /// Closed; cannot be resumed.
    Closed,
}

/// Playback element configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementOptions {
    /// Element output is muted.
    pub muted: bool,
    /// Start playback as soon as media is attached.
    pub autoplay: bool,
    /// Inline playback (no fullscreen takeover on mobile).
    pub plays_inline: bool,
    /// Element volume (0.0-1.0).
    pub volume: f32,
}

impl ElementOptions {
    /// Silent element that keeps a stream flowing into a source node.
    #[must_use]
    pub const fn backing() -> Self {
        Self {
            muted: true,
            autoplay: false,
            plays_inline: true,
            volume: 0.0,
        }
    }

    /// Audible, non-spatial element for party music.
    #[must_use]
    pub const fn music() -> Self {
        Self {
            muted: false,
            autoplay: true,
            plays_inline: true,
            volume: 1.0,
        }
    }
}

/// Release primitives for platform resources.
///
/// Each call is independent so that a failure releasing one resource kind
/// never prevents the others from being released.
pub trait ResourceReleaser {
    /// Pause the element, clear its media and detach it.
    fn release_element(&mut self, element: ElementId) -> AudioResult<()>;

    /// Stop a locally published track.
    fn stop_local_track(&mut self, track: LocalTrackId) -> AudioResult<()>;

    /// Stop every track of a media stream.
    fn stop_stream(&mut self, stream: MediaStreamId) -> AudioResult<()>;

    /// Revoke an object URL.
    fn revoke_object_url(&mut self, url: &str) -> AudioResult<()>;
}

/// Audio platform used by the spatial graph.
pub trait AudioBackend: ResourceReleaser {
    /// Create the processing context.
    fn create_context(&mut self, sample_rate: u32) -> AudioResult<()>;

    /// Current context state, `None` if no context exists.
    fn context_state(&self) -> Option<ContextState>;

    /// Resume a suspended context.
    fn resume_context(&mut self) -> AudioResult<()>;

    /// Close the context and release every node.
    fn close_context(&mut self) -> AudioResult<()>;

    /// Create a gain node.
    fn create_gain(&mut self) -> AudioResult<NodeId>;

    /// Create a 3D panner node.
    fn create_panner(&mut self, params: &PannerParams) -> AudioResult<NodeId>;

    /// Create a source node reading from a media stream.
    fn create_stream_source(&mut self, stream: MediaStreamId) -> AudioResult<NodeId>;

    /// Connect `from`'s output to `to`'s input.
    fn connect(&mut self, from: NodeId, to: NodeId) -> AudioResult<()>;

    /// Connect a node to the context output.
    fn connect_to_destination(&mut self, node: NodeId) -> AudioResult<()>;

    /// Disconnect every output of a node and drop it.
    fn disconnect(&mut self, node: NodeId) -> AudioResult<()>;

    /// Set a gain value immediately.
    fn set_gain(&mut self, node: NodeId, value: f32) -> AudioResult<()>;

    /// Set a panner position immediately.
    fn set_panner_position(&mut self, node: NodeId, position: Vec3) -> AudioResult<()>;

    /// Set the listener position and orientation.
    fn set_listener(&mut self, position: Vec3, forward: Vec3, up: Vec3) -> AudioResult<()>;

    /// Create a playback element bound to a media stream.
    fn create_element(
        &mut self,
        stream: MediaStreamId,
        options: ElementOptions,
    ) -> AudioResult<ElementId>;

    /// Start playback on an element.
    fn play_element(&mut self, element: ElementId) -> Result<(), PlaybackError>;
}
