//! In-memory audio backend.
//!
//! Records the node graph, element states and released resources instead of
//! producing sound. Used by tests and the simulator, and as the no-audio
//! fallback on hosts without an output device. Failure switches let callers
//! reproduce platform misbehaviour (context creation failing, autoplay
//! blocked, node creation failing mid-chain).

use std::collections::{HashMap, HashSet};

use glam::Vec3;
use tracing::debug;
use vibes_common::MediaStreamId;

use crate::backend::{
    AudioBackend, AudioError, AudioResult, ContextState, ElementId, ElementOptions,
    LocalTrackId, NodeId, PlaybackError, ResourceReleaser,
};
use crate::panner::PannerParams;

/// What a headless node does.
#[derive(Debug, Clone, PartialEq)]
pub enum HeadlessNodeKind {
    /// Gain node with its current value.
    Gain(f32),
    /// Panner node with its parameters and position.
    Panner {
        /// Panner parameters.
        params: PannerParams,
        /// Current position.
        position: Vec3,
    },
    /// Stream source node.
    StreamSource(MediaStreamId),
}

/// A node in the recorded graph.
#[derive(Debug, Clone)]
pub struct HeadlessNode {
    /// Node behaviour.
    pub kind: HeadlessNodeKind,
    /// Downstream nodes.
    pub outputs: Vec<NodeId>,
    /// Connected to the context output.
    pub to_destination: bool,
}

/// Element playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    /// Created, not started.
    Idle,
    /// Playing.
    Playing,
    /// Paused.
    Paused,
}

/// A recorded playback element.
#[derive(Debug, Clone)]
pub struct HeadlessElement {
    /// Attached stream, cleared on release.
    pub stream: Option<MediaStreamId>,
    /// Element options.
    pub options: ElementOptions,
    /// Playback state.
    pub state: ElementState,
}

/// Failure switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessFailures {
    /// `create_context` fails.
    pub context_creation: bool,
    /// New contexts start suspended.
    pub start_suspended: bool,
    /// `resume_context` fails.
    pub resume: bool,
    /// `play_element` reports autoplay blocked.
    pub autoplay_blocked: bool,
    /// `create_panner` fails.
    pub panner_creation: bool,
    /// `create_element` fails.
    pub element_creation: bool,
    /// `release_element` fails (the element is still removed).
    pub element_release: bool,
}

/// In-memory [`AudioBackend`].
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    context: Option<ContextState>,
    sample_rate: u32,
    nodes: HashMap<NodeId, HeadlessNode>,
    elements: HashMap<ElementId, HeadlessElement>,
    listener: (Vec3, Vec3, Vec3),
    stopped_tracks: HashSet<LocalTrackId>,
    stopped_streams: HashSet<MediaStreamId>,
    live_urls: HashSet<String>,
    revoked_urls: Vec<String>,
    next_id: u64,
    /// Active failure switches.
    pub failures: HeadlessFailures,
}

impl HeadlessBackend {
    /// Create a backend that behaves like a permissive platform.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend with failure switches.
    #[must_use]
    pub fn with_failures(failures: HeadlessFailures) -> Self {
        Self {
            failures,
            ..Self::default()
        }
    }

    fn next_raw(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn require_context(&self) -> AudioResult<()> {
        match self.context {
            Some(ContextState::Running | ContextState::Suspended) => Ok(()),
            _ => Err(AudioError::NotInitialized),
        }
    }

    fn insert_node(&mut self, kind: HeadlessNodeKind) -> AudioResult<NodeId> {
        self.require_context()?;
        let id = NodeId::new(self.next_raw());
        self.nodes.insert(
            id,
            HeadlessNode {
                kind,
                outputs: Vec::new(),
                to_destination: false,
            },
        );
        Ok(id)
    }

    /// Mint a fresh object URL, as the platform does for uploaded files.
    pub fn create_object_url(&mut self) -> String {
        let url = format!("blob:headless/{}", self.next_raw());
        self.live_urls.insert(url.clone());
        url
    }

    /// Sample rate the context was created with.
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of live nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Look up a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&HeadlessNode> {
        self.nodes.get(&id)
    }

    /// Whether `from` feeds `to`.
    #[must_use]
    pub fn is_connected(&self, from: NodeId, to: NodeId) -> bool {
        self.nodes.get(&from).is_some_and(|n| n.outputs.contains(&to))
    }

    /// Current gain value of a gain node.
    #[must_use]
    pub fn gain_value(&self, id: NodeId) -> Option<f32> {
        match self.nodes.get(&id)?.kind {
            HeadlessNodeKind::Gain(value) => Some(value),
            _ => None,
        }
    }

    /// Current position of a panner node.
    #[must_use]
    pub fn panner_position(&self, id: NodeId) -> Option<Vec3> {
        match self.nodes.get(&id)?.kind {
            HeadlessNodeKind::Panner { position, .. } => Some(position),
            _ => None,
        }
    }

    /// Attenuation the panner applies at its current position.
    #[must_use]
    pub fn panner_gain(&self, id: NodeId) -> Option<f32> {
        match &self.nodes.get(&id)?.kind {
            HeadlessNodeKind::Panner { params, position } => Some(params.gain_at(position.length())),
            _ => None,
        }
    }

    /// Listener position, forward and up vectors.
    #[must_use]
    pub const fn listener(&self) -> (Vec3, Vec3, Vec3) {
        self.listener
    }

    /// Number of live elements.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Look up an element.
    #[must_use]
    pub fn element(&self, id: ElementId) -> Option<&HeadlessElement> {
        self.elements.get(&id)
    }

    /// Number of elements currently playing.
    #[must_use]
    pub fn playing_count(&self) -> usize {
        self.elements
            .values()
            .filter(|e| e.state == ElementState::Playing)
            .count()
    }

    /// Whether a local track was stopped.
    #[must_use]
    pub fn is_track_stopped(&self, track: LocalTrackId) -> bool {
        self.stopped_tracks.contains(&track)
    }

    /// Whether a stream's tracks were stopped.
    #[must_use]
    pub fn is_stream_stopped(&self, stream: MediaStreamId) -> bool {
        self.stopped_streams.contains(&stream)
    }

    /// Whether an object URL is still valid.
    #[must_use]
    pub fn is_url_live(&self, url: &str) -> bool {
        self.live_urls.contains(url)
    }

    /// Revoked object URLs in revocation order.
    #[must_use]
    pub fn revoked_urls(&self) -> &[String] {
        &self.revoked_urls
    }
}

impl ResourceReleaser for HeadlessBackend {
    fn release_element(&mut self, element: ElementId) -> AudioResult<()> {
        if self.elements.remove(&element).is_none() {
            return Err(AudioError::ElementNotFound(element));
        }
        if self.failures.element_release {
            return Err(AudioError::Backend("element detach failed".into()));
        }
        Ok(())
    }

    fn stop_local_track(&mut self, track: LocalTrackId) -> AudioResult<()> {
        self.stopped_tracks.insert(track);
        Ok(())
    }

    fn stop_stream(&mut self, stream: MediaStreamId) -> AudioResult<()> {
        self.stopped_streams.insert(stream);
        Ok(())
    }

    fn revoke_object_url(&mut self, url: &str) -> AudioResult<()> {
        self.live_urls.remove(url);
        self.revoked_urls.push(url.to_string());
        Ok(())
    }
}

impl AudioBackend for HeadlessBackend {
    fn create_context(&mut self, sample_rate: u32) -> AudioResult<()> {
        if self.failures.context_creation {
            return Err(AudioError::ContextUnavailable("no output device".into()));
        }
        self.sample_rate = sample_rate;
        self.context = Some(if self.failures.start_suspended {
            ContextState::Suspended
        } else {
            ContextState::Running
        });
        debug!("Headless context created at {} Hz", sample_rate);
        Ok(())
    }

    fn context_state(&self) -> Option<ContextState> {
        self.context
    }

    fn resume_context(&mut self) -> AudioResult<()> {
        match self.context {
            Some(ContextState::Closed) | None => Err(AudioError::NotInitialized),
            Some(_) if self.failures.resume => {
                Err(AudioError::ContextUnavailable("resume rejected".into()))
            },
            Some(_) => {
                self.context = Some(ContextState::Running);
                Ok(())
            },
        }
    }

    fn close_context(&mut self) -> AudioResult<()> {
        self.require_context()?;
        self.context = Some(ContextState::Closed);
        self.nodes.clear();
        Ok(())
    }

    fn create_gain(&mut self) -> AudioResult<NodeId> {
        self.insert_node(HeadlessNodeKind::Gain(1.0))
    }

    fn create_panner(&mut self, params: &PannerParams) -> AudioResult<NodeId> {
        if self.failures.panner_creation {
            return Err(AudioError::Backend("panner creation failed".into()));
        }
        self.insert_node(HeadlessNodeKind::Panner {
            params: *params,
            position: Vec3::ZERO,
        })
    }

    fn create_stream_source(&mut self, stream: MediaStreamId) -> AudioResult<NodeId> {
        self.insert_node(HeadlessNodeKind::StreamSource(stream))
    }

    fn connect(&mut self, from: NodeId, to: NodeId) -> AudioResult<()> {
        if !self.nodes.contains_key(&to) {
            return Err(AudioError::NodeNotFound(to));
        }
        let node = self.nodes.get_mut(&from).ok_or(AudioError::NodeNotFound(from))?;
        if !node.outputs.contains(&to) {
            node.outputs.push(to);
        }
        Ok(())
    }

    fn connect_to_destination(&mut self, node: NodeId) -> AudioResult<()> {
        let node = self.nodes.get_mut(&node).ok_or(AudioError::NodeNotFound(node))?;
        node.to_destination = true;
        Ok(())
    }

    fn disconnect(&mut self, node: NodeId) -> AudioResult<()> {
        self.nodes.remove(&node).ok_or(AudioError::NodeNotFound(node))?;
        for other in self.nodes.values_mut() {
            other.outputs.retain(|n| *n != node);
        }
        Ok(())
    }

    fn set_gain(&mut self, node: NodeId, value: f32) -> AudioResult<()> {
        match self.nodes.get_mut(&node).map(|n| &mut n.kind) {
            Some(HeadlessNodeKind::Gain(current)) => {
                *current = value;
                Ok(())
            },
            _ => Err(AudioError::NodeNotFound(node)),
        }
    }

    fn set_panner_position(&mut self, node: NodeId, position: Vec3) -> AudioResult<()> {
        match self.nodes.get_mut(&node).map(|n| &mut n.kind) {
            Some(HeadlessNodeKind::Panner { position: current, .. }) => {
                *current = position;
                Ok(())
            },
            _ => Err(AudioError::NodeNotFound(node)),
        }
    }

    fn set_listener(&mut self, position: Vec3, forward: Vec3, up: Vec3) -> AudioResult<()> {
        self.require_context()?;
        self.listener = (position, forward, up);
        Ok(())
    }

    fn create_element(
        &mut self,
        stream: MediaStreamId,
        options: ElementOptions,
    ) -> AudioResult<ElementId> {
        if self.failures.element_creation {
            return Err(AudioError::Backend("element creation failed".into()));
        }
        let id = ElementId::new(self.next_raw());
        let state = if options.autoplay && !self.failures.autoplay_blocked {
            ElementState::Playing
        } else {
            ElementState::Idle
        };
        self.elements.insert(
            id,
            HeadlessElement {
                stream: Some(stream),
                options,
                state,
            },
        );
        Ok(id)
    }

    fn play_element(&mut self, element: ElementId) -> Result<(), PlaybackError> {
        let blocked = self.failures.autoplay_blocked;
        let el = self
            .elements
            .get_mut(&element)
            .ok_or(AudioError::ElementNotFound(element))?;
        if blocked {
            return Err(PlaybackError::AutoplayBlocked);
        }
        el.state = ElementState::Playing;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nodes_require_context() {
        let mut backend = HeadlessBackend::new();
        assert_eq!(backend.create_gain(), Err(AudioError::NotInitialized));

        backend.create_context(44_100).expect("context");
        assert!(backend.create_gain().is_ok());
        assert_eq!(backend.sample_rate(), 44_100);
    }

    #[test]
    fn test_disconnect_removes_edges() {
        let mut backend = HeadlessBackend::new();
        backend.create_context(44_100).expect("context");
        let a = backend.create_gain().expect("gain");
        let b = backend.create_gain().expect("gain");
        backend.connect(a, b).expect("connect");
        assert!(backend.is_connected(a, b));

        backend.disconnect(b).expect("disconnect");
        assert!(!backend.is_connected(a, b));
        assert_eq!(backend.node_count(), 1);
    }

    #[test]
    fn test_autoplay_blocked_then_allowed() {
        let mut backend = HeadlessBackend::with_failures(HeadlessFailures {
            autoplay_blocked: true,
            ..HeadlessFailures::default()
        });
        let el = backend
            .create_element(MediaStreamId::new(1), ElementOptions::music())
            .expect("element");
        assert_eq!(backend.play_element(el), Err(PlaybackError::AutoplayBlocked));
        assert_eq!(backend.playing_count(), 0);

        backend.failures.autoplay_blocked = false;
        assert!(backend.play_element(el).is_ok());
        assert_eq!(backend.playing_count(), 1);
    }

    #[test]
    fn test_object_url_revocation() {
        let mut backend = HeadlessBackend::new();
        let url = backend.create_object_url();
        assert!(backend.is_url_live(&url));
        backend.revoke_object_url(&url).expect("revoke");
        assert!(!backend.is_url_live(&url));
        assert_eq!(backend.revoked_urls(), &[url]);
    }

    #[test]
    fn test_close_context_drops_nodes() {
        let mut backend = HeadlessBackend::new();
        backend.create_context(44_100).expect("context");
        backend.create_gain().expect("gain");
        backend.close_context().expect("close");
        assert_eq!(backend.node_count(), 0);
        assert_eq!(backend.context_state(), Some(ContextState::Closed));
        assert!(backend.resume_context().is_err());
    }
}
