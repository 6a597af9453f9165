//! Spatial audio graph.
//!
//! One graph per room session. Every remote voice participant gets a chain
//!
//! ```text
//! stream ─▶ source ─▶ gain (proximity volume) ─▶ panner (HRTF) ─▶ master ─▶ output
//!   └────▶ backing element (muted, inline)
//! ```
//!
//! The listener sits at the origin facing north; sources are placed at their
//! projected offset from the local participant. Music tracks never enter the
//! graph: a party joiner hears them through a plain, full-volume element
//! started with [`SpatialAudioGraph::start_music`].
//!
//! Public operations log failures and report them as `bool` instead of
//! returning errors. A failed chain construction is rolled back, so the graph
//! never holds a partially wired source.

use std::time::Duration;

use ahash::AHashMap;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use vibes_common::{MediaStreamId, ParticipantId, Position, RemoteAudioTrack, TrackName};

use crate::backend::{
    AudioBackend, AudioResult, ContextState, ElementId, ElementOptions, NodeId, PlaybackError,
};
use crate::gesture::{GestureKind, GestureResumeGate, DEFAULT_GESTURE_TIMEOUT};
use crate::panner::PannerParams;
use crate::projection::ProjectionMode;
use crate::resource::{ResourceTracker, TrackedResources};

/// Default processing sample rate.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Listener facing direction (north, into the screen).
pub const LISTENER_FORWARD: Vec3 = Vec3::new(0.0, 0.0, -1.0);

/// Listener up vector.
pub const LISTENER_UP: Vec3 = Vec3::Y;

/// Spatial graph configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Context sample rate in Hz.
    pub sample_rate: u32,
    /// Geographic projection.
    pub projection: ProjectionMode,
    /// Panner node parameters.
    pub panner: PannerParams,
    /// Lifetime of an autoplay gesture listener, in milliseconds.
    pub gesture_timeout_ms: u64,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            projection: ProjectionMode::GreatCircle,
            panner: PannerParams::default(),
            gesture_timeout_ms: DEFAULT_GESTURE_TIMEOUT.as_millis() as u64,
        }
    }
}

impl SpatialConfig {
    /// Gesture timeout as a duration.
    #[must_use]
    pub const fn gesture_timeout(&self) -> Duration {
        Duration::from_millis(self.gesture_timeout_ms)
    }

    /// Use a different projection.
    #[must_use]
    pub const fn with_projection(mut self, projection: ProjectionMode) -> Self {
        self.projection = projection;
        self
    }
}

/// A spatialised remote voice.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSource {
    /// Owning participant.
    pub participant: ParticipantId,
    /// Voice track feeding the chain.
    pub track: TrackName,
    /// Media stream of the track.
    pub stream: MediaStreamId,
    /// Stream source node.
    pub source_node: NodeId,
    /// Per-source gain node.
    pub gain_node: NodeId,
    /// Panner node.
    pub panner_node: NodeId,
    /// Muted backing element.
    pub element: ElementId,
    /// Last position reported for the participant.
    pub last_known_position: Position,
    /// Current per-source volume.
    pub volume: f32,
}

#[derive(Debug, Clone, PartialEq)]
struct MusicPlayback {
    track: TrackName,
    element: ElementId,
}

fn voice_key(participant: &ParticipantId) -> String {
    format!("voice:{participant}")
}

fn music_key(participant: &ParticipantId) -> String {
    format!("music:{participant}")
}

/// Per-session spatial audio graph.
#[derive(Debug)]
pub struct SpatialAudioGraph<B: AudioBackend> {
    backend: B,
    config: SpatialConfig,
    master: Option<NodeId>,
    master_volume: f32,
    listener_position: Position,
    sources: AHashMap<ParticipantId, AudioSource>,
    music: AHashMap<ParticipantId, MusicPlayback>,
    resources: ResourceTracker,
    gestures: GestureResumeGate,
}

impl<B: AudioBackend> SpatialAudioGraph<B> {
    /// Create an uninitialized graph over `backend`.
    pub fn new(backend: B, config: SpatialConfig) -> Self {
        Self {
            backend,
            config,
            master: None,
            master_volume: 1.0,
            listener_position: Position::ORIGIN,
            sources: AHashMap::new(),
            music: AHashMap::new(),
            resources: ResourceTracker::new(),
            gestures: GestureResumeGate::new(config.gesture_timeout()),
        }
    }

    /// Create the context, master gain and listener. Idempotent.
    ///
    /// Returns false if the platform has no usable audio; the graph then
    /// stays uninitialized and every source operation is a no-op.
    pub fn initialize(&mut self) -> bool {
        if self.master.is_some() {
            return true;
        }

        match self.backend.context_state() {
            Some(ContextState::Running) => {},
            Some(ContextState::Suspended) => self.resume_suspended_context(),
            Some(ContextState::Closed) | None => {
                if let Err(e) = self.backend.create_context(self.config.sample_rate) {
                    error!("Failed to create audio context: {e}");
                    return false;
                }
                if self.backend.context_state() == Some(ContextState::Suspended) {
                    self.resume_suspended_context();
                }
            },
        }

        let master = match self.backend.create_gain() {
            Ok(node) => node,
            Err(e) => {
                error!("Failed to create master gain: {e}");
                return false;
            },
        };
        if let Err(e) = self.wire_master(master) {
            error!("Failed to wire master gain: {e}");
            if let Err(e) = self.backend.disconnect(master) {
                debug!("Master rollback: {e}");
            }
            return false;
        }

        self.master = Some(master);
        info!(
            "Spatial audio initialized ({} Hz, {} projection)",
            self.config.sample_rate,
            self.config.projection.name()
        );
        true
    }

    fn resume_suspended_context(&mut self) {
        // A rejected resume is retried on the next user gesture.
        if let Err(e) = self.backend.resume_context() {
            warn!("Audio context suspended until user gesture: {e}");
        }
    }

    fn wire_master(&mut self, master: NodeId) -> AudioResult<()> {
        self.backend.connect_to_destination(master)?;
        self.backend.set_gain(master, self.master_volume)?;
        self.backend.set_listener(Vec3::ZERO, LISTENER_FORWARD, LISTENER_UP)
    }

    /// Whether [`Self::initialize`] succeeded.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.master.is_some()
    }

    /// Route a remote voice track into the graph. Idempotent per participant.
    pub fn add_source(&mut self, track: &RemoteAudioTrack, position: Position) -> bool {
        if track.name.is_music() {
            debug!(participant = %track.participant, track = %track.name, "Music tracks are not spatialised");
            return false;
        }
        let Some(master) = self.master else {
            warn!(participant = %track.participant, "Cannot add source: audio graph not initialized");
            return false;
        };
        if self.sources.contains_key(&track.participant) {
            debug!(participant = %track.participant, "Source already present");
            return true;
        }

        let element = match self
            .backend
            .create_element(track.stream, ElementOptions::backing())
        {
            Ok(element) => element,
            Err(e) => {
                error!(participant = %track.participant, "Failed to create backing element: {e}");
                return false;
            },
        };

        let offset = self
            .config
            .projection
            .project(self.listener_position, position)
            .to_panner();
        let mut created = Vec::with_capacity(3);
        let chain = self.build_chain(track.stream, master, offset, &mut created);
        let (source_node, gain_node, panner_node) = match chain {
            Ok(nodes) => nodes,
            Err(e) => {
                error!(participant = %track.participant, "Failed to build source chain: {e}");
                self.rollback(&created, element);
                return false;
            },
        };

        let key = voice_key(&track.participant);
        self.resources.register(key.clone(), TrackedResources::element(element));
        self.play_or_arm(&key, element);

        self.sources.insert(
            track.participant.clone(),
            AudioSource {
                participant: track.participant.clone(),
                track: track.name.clone(),
                stream: track.stream,
                source_node,
                gain_node,
                panner_node,
                element,
                last_known_position: position,
                volume: 1.0,
            },
        );
        info!(participant = %track.participant, track = %track.name, "Added spatial source");
        true
    }

    fn build_chain(
        &mut self,
        stream: MediaStreamId,
        master: NodeId,
        offset: Vec3,
        created: &mut Vec<NodeId>,
    ) -> AudioResult<(NodeId, NodeId, NodeId)> {
        let source = self.backend.create_stream_source(stream)?;
        created.push(source);
        let gain = self.backend.create_gain()?;
        created.push(gain);
        let panner = self.backend.create_panner(&self.config.panner)?;
        created.push(panner);

        self.backend.connect(source, gain)?;
        self.backend.connect(gain, panner)?;
        self.backend.connect(panner, master)?;
        self.backend.set_gain(gain, 1.0)?;
        self.backend.set_panner_position(panner, offset)?;
        Ok((source, gain, panner))
    }

    fn rollback(&mut self, nodes: &[NodeId], element: ElementId) {
        for node in nodes {
            if let Err(e) = self.backend.disconnect(*node) {
                debug!("Rollback disconnect: {e}");
            }
        }
        if let Err(e) = self.backend.release_element(element) {
            debug!("Rollback element release: {e}");
        }
    }

    fn play_or_arm(&mut self, key: &str, element: ElementId) {
        match self.backend.play_element(element) {
            Ok(()) => {},
            Err(PlaybackError::AutoplayBlocked) => {
                info!(resource = %key, "Playback blocked, waiting for user gesture");
                self.gestures.arm(key, element);
            },
            Err(e) => warn!(resource = %key, "Playback failed: {e}"),
        }
    }

    /// Tear down a participant's chain. Returns false if none existed.
    pub fn remove_source(&mut self, participant: &ParticipantId) -> bool {
        let Some(source) = self.sources.remove(participant) else {
            return false;
        };
        for node in [source.source_node, source.gain_node, source.panner_node] {
            if let Err(e) = self.backend.disconnect(node) {
                warn!(participant = %participant, "Failed to disconnect node: {e}");
            }
        }
        let key = voice_key(participant);
        self.gestures.disarm_owner(&key);
        self.resources.cleanup(&key, &mut self.backend);
        info!(participant = %participant, "Removed spatial source");
        true
    }

    /// Move the listener and re-place every source relative to it.
    pub fn update_listener_position(&mut self, position: Position) {
        self.listener_position = position;
        for source in self.sources.values() {
            let offset = self
                .config
                .projection
                .project(position, source.last_known_position)
                .to_panner();
            if let Err(e) = self.backend.set_panner_position(source.panner_node, offset) {
                warn!(participant = %source.participant, "Failed to move panner: {e}");
            }
        }
    }

    /// Move one source. Returns false if the participant has no source.
    pub fn update_source_position(&mut self, participant: &ParticipantId, position: Position) -> bool {
        let Some(source) = self.sources.get_mut(participant) else {
            return false;
        };
        source.last_known_position = position;
        let offset = self
            .config
            .projection
            .project(self.listener_position, position)
            .to_panner();
        if let Err(e) = self.backend.set_panner_position(source.panner_node, offset) {
            warn!(participant = %participant, "Failed to move panner: {e}");
        }
        true
    }

    /// Set the master volume (clamped to 0.0-1.0).
    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 1.0);
        if let Some(master) = self.master {
            if let Err(e) = self.backend.set_gain(master, self.master_volume) {
                warn!("Failed to set master volume: {e}");
            }
        }
    }

    /// Set a source's volume (clamped to 0.0-1.0). Returns false if absent.
    pub fn set_source_volume(&mut self, participant: &ParticipantId, volume: f32) -> bool {
        let Some(source) = self.sources.get_mut(participant) else {
            return false;
        };
        source.volume = volume.clamp(0.0, 1.0);
        if let Err(e) = self.backend.set_gain(source.gain_node, source.volume) {
            warn!(participant = %participant, "Failed to set source volume: {e}");
        }
        true
    }

    /// Start non-spatial playback of a party's music track.
    ///
    /// Replaces any previous music from the same participant.
    pub fn start_music(&mut self, track: &RemoteAudioTrack) -> bool {
        if !track.name.is_music() {
            warn!(participant = %track.participant, track = %track.name, "Not a music track");
            return false;
        }
        if let Some(current) = self.music.get(&track.participant) {
            if current.track == track.name {
                return true;
            }
            self.stop_music(&track.participant);
        }

        let element = match self
            .backend
            .create_element(track.stream, ElementOptions::music())
        {
            Ok(element) => element,
            Err(e) => {
                error!(participant = %track.participant, "Failed to create music element: {e}");
                return false;
            },
        };

        let key = music_key(&track.participant);
        self.resources.register(key.clone(), TrackedResources::element(element));
        self.play_or_arm(&key, element);
        self.music.insert(
            track.participant.clone(),
            MusicPlayback {
                track: track.name.clone(),
                element,
            },
        );
        info!(participant = %track.participant, track = %track.name, "Started party music");
        true
    }

    /// Stop a participant's music. Returns false if none was playing.
    pub fn stop_music(&mut self, participant: &ParticipantId) -> bool {
        let Some(playback) = self.music.remove(participant) else {
            return false;
        };
        let key = music_key(participant);
        self.gestures.disarm_owner(&key);
        self.resources.cleanup(&key, &mut self.backend);
        info!(participant = %participant, track = %playback.track, "Stopped party music");
        true
    }

    /// Whether music from `participant` is playing (or waiting for a gesture).
    #[must_use]
    pub fn has_music(&self, participant: &ParticipantId) -> bool {
        self.music.contains_key(participant)
    }

    /// Music element for a participant.
    #[must_use]
    pub fn music_element(&self, participant: &ParticipantId) -> Option<ElementId> {
        self.music.get(participant).map(|m| m.element)
    }

    /// Forward a user gesture: resume the context and retry blocked elements.
    ///
    /// Returns the number of elements that left the armed set.
    pub fn handle_user_gesture(&mut self, kind: GestureKind) -> usize {
        if self.backend.context_state() == Some(ContextState::Suspended) {
            match self.backend.resume_context() {
                Ok(()) => info!("Audio context resumed after {:?}", kind),
                Err(e) => warn!("Audio context resume failed: {e}"),
            }
        }

        let backend = &mut self.backend;
        self.gestures.resume(kind, |element| match backend.play_element(element) {
            Ok(()) => true,
            Err(PlaybackError::AutoplayBlocked) => false,
            Err(e) => {
                warn!("Dropping blocked element {:?}: {e}", element);
                true
            },
        })
    }

    /// Whether the host should listen for click, touch and key events.
    #[must_use]
    pub fn wants_gesture_listeners(&self) -> bool {
        self.gestures.is_armed() || self.backend.context_state() == Some(ContextState::Suspended)
    }

    /// Advance time-driven state.
    pub fn update(&mut self, dt: Duration) {
        for element in self.gestures.update(dt) {
            debug!("Gave up waiting for a gesture on {:?}", element);
        }
    }

    /// Track a host-created resource.
    pub fn register_resource(&mut self, id: impl Into<String>, resources: TrackedResources) {
        self.resources.register(id, resources);
    }

    /// Merge into a host-created resource entry.
    pub fn update_resource(&mut self, id: impl Into<String>, patch: TrackedResources) {
        self.resources.update(id, patch);
    }

    /// Release a tracked resource. Returns false if unknown.
    pub fn cleanup_resource(&mut self, id: &str) -> bool {
        self.gestures.disarm_owner(id);
        self.resources.cleanup(id, &mut self.backend)
    }

    /// Whether a resource is tracked under `id`.
    #[must_use]
    pub fn has_resource(&self, id: &str) -> bool {
        self.resources.has(id)
    }

    /// Tracked resources.
    #[must_use]
    pub const fn resources(&self) -> &ResourceTracker {
        &self.resources
    }

    /// Number of spatial sources.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Whether a participant has a spatial source.
    #[must_use]
    pub fn has_source(&self, participant: &ParticipantId) -> bool {
        self.sources.contains_key(participant)
    }

    /// Look up a source.
    #[must_use]
    pub fn source(&self, participant: &ParticipantId) -> Option<&AudioSource> {
        self.sources.get(participant)
    }

    /// Current volume of a source.
    #[must_use]
    pub fn source_volume(&self, participant: &ParticipantId) -> Option<f32> {
        self.sources.get(participant).map(|s| s.volume)
    }

    /// Iterate over sources.
    pub fn sources(&self) -> impl Iterator<Item = &AudioSource> {
        self.sources.values()
    }

    /// Master volume.
    #[must_use]
    pub const fn master_volume(&self) -> f32 {
        self.master_volume
    }

    /// Last listener position.
    #[must_use]
    pub const fn listener_position(&self) -> Position {
        self.listener_position
    }

    /// Graph configuration.
    #[must_use]
    pub const fn config(&self) -> &SpatialConfig {
        &self.config
    }

    /// Underlying backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Underlying backend, mutably.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Tear down every source, music element and tracked resource, then
    /// close the context. The graph may be initialized again afterwards.
    pub fn destroy(&mut self) {
        let participants: Vec<ParticipantId> = self.sources.keys().cloned().collect();
        for participant in &participants {
            self.remove_source(participant);
        }
        let playing: Vec<ParticipantId> = self.music.keys().cloned().collect();
        for participant in &playing {
            self.stop_music(participant);
        }
        self.gestures.disarm_all();
        self.resources.cleanup_all(&mut self.backend);

        if let Some(master) = self.master.take() {
            if let Err(e) = self.backend.disconnect(master) {
                debug!("Master disconnect: {e}");
            }
        }
        if matches!(
            self.backend.context_state(),
            Some(ContextState::Running | ContextState::Suspended)
        ) {
            if let Err(e) = self.backend.close_context() {
                warn!("Failed to close audio context: {e}");
            }
            info!("Spatial audio destroyed");
        }
    }
}
