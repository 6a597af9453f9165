//! Distance-driven voice subscriptions.
//!
//! Every (participant, voice track) pair is a link. A link is created when
//! the publisher comes within the voice radius and removed when they leave
//! it, stop publishing or disconnect:
//!
//! ```text
//!              in range                    subscribed
//! (none) ───────────────▶ Subscribing ─────────────────▶ Subscribed
//!    ▲                      │    ▲                          │
//!    │           failure    ▼    │ timer due                │ out of range
//!    │                   RetryWait                          │ track gone
//!    └──────────────────────────────────────────────────────┘
//! ```
//!
//! The manager never keeps its own position state: each evaluation reads the
//! current roster and local position, so events may arrive in any order.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vibes_audio::{AudioBackend, ProjectionMode, SpatialAudioGraph};
use vibes_common::{ModerationNotice, ParticipantId, Position, SignalingError, TrackName};

use crate::events::{NoticeBus, SessionNotice};
use crate::retry::{RetryDecision, RetryPolicy, RetryScheduler};
use crate::roster::Roster;
use crate::signaling::TrackSubscriber;

/// Default voice chat radius in meters.
pub const DEFAULT_VOICE_RADIUS_M: f64 = 50.0;

/// Proximity configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    /// Voice chat radius in meters.
    pub radius_m: f64,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            radius_m: DEFAULT_VOICE_RADIUS_M,
        }
    }
}

/// Linear proximity volume: 1.0 at the listener, 0.0 at and beyond `radius`.
#[must_use]
pub fn voice_volume(distance: f64, radius: f64) -> f32 {
    if radius <= 0.0 || !distance.is_finite() {
        return 0.0;
    }
    (1.0 - distance.max(0.0) / radius).max(0.0) as f32
}

/// State of a voice link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceLinkState {
    /// Subscribe request in flight.
    Subscribing,
    /// Subscribed and routed.
    Subscribed,
    /// Waiting for a retry timer.
    RetryWait,
}

type LinkKey = (ParticipantId, TrackName);

/// Collaborators an evaluation works with.
pub struct VoiceContext<'a, B: AudioBackend, S: TrackSubscriber> {
    /// Local listener position.
    pub local: Position,
    /// Remote participants.
    pub roster: &'a Roster,
    /// Room client.
    pub subscriber: &'a mut S,
    /// Spatial graph.
    pub graph: &'a mut SpatialAudioGraph<B>,
    /// Host notices.
    pub notices: &'a NoticeBus,
}

/// Subscribes to nearby voices and drops distant ones.
#[derive(Debug)]
pub struct ProximityVoiceManager {
    config: ProximityConfig,
    projection: ProjectionMode,
    links: BTreeMap<LinkKey, VoiceLinkState>,
    retries: RetryScheduler<LinkKey>,
}

impl ProximityVoiceManager {
    /// Create a manager measuring distances with `projection`.
    #[must_use]
    pub fn new(config: ProximityConfig, projection: ProjectionMode, policy: RetryPolicy) -> Self {
        Self {
            config,
            projection,
            links: BTreeMap::new(),
            retries: RetryScheduler::new(policy),
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ProximityConfig {
        &self.config
    }

    /// Distance between the local user and a position.
    #[must_use]
    pub fn distance(&self, local: Position, remote: Position) -> f64 {
        self.projection.distance(local, remote)
    }

    /// Re-derive every link from the current roster and local position.
    pub fn evaluate<B: AudioBackend, S: TrackSubscriber>(&mut self, ctx: &mut VoiceContext<'_, B, S>) {
        let radius = self.config.radius_m;
        let roster = ctx.roster;
        let mut wanted = BTreeSet::new();

        for handle in roster.iter() {
            let distance = self.distance(ctx.local, handle.position());
            if distance > radius {
                continue;
            }
            let publications = match ctx.subscriber.publications(&handle.identity) {
                Ok(publications) => publications,
                Err(e) => {
                    debug!(participant = %handle.identity, "No publications: {e}");
                    continue;
                },
            };

            for publication in publications.iter().filter(|p| !p.name.is_music()) {
                let key = (handle.identity.clone(), publication.name.clone());
                wanted.insert(key.clone());
                let state = self.links.get(&key).copied();
                match state {
                    Some(VoiceLinkState::Subscribed) => {
                        self.refresh(ctx, &key, handle.position(), distance);
                    },
                    Some(VoiceLinkState::Subscribing | VoiceLinkState::RetryWait) => {},
                    None => self.attempt(ctx, key, handle.position(), distance),
                }
            }
        }

        let stale: Vec<LinkKey> = self
            .links
            .keys()
            .filter(|k| !wanted.contains(*k))
            .cloned()
            .collect();
        for key in stale {
            self.teardown(ctx.subscriber, ctx.graph, &key);
        }
        self.retries.cancel_where(|k| !wanted.contains(k));
    }

    fn refresh<B: AudioBackend, S: TrackSubscriber>(
        &mut self,
        ctx: &mut VoiceContext<'_, B, S>,
        key: &LinkKey,
        position: Position,
        distance: f64,
    ) {
        let (participant, track) = key;
        if !ctx.graph.has_source(participant) {
            // Subscribed before the graph could take it (audio came up late).
            if let Some(remote) = ctx.subscriber.subscribed_track(participant, track) {
                ctx.graph.add_source(&remote, position);
            }
        }
        ctx.graph.update_source_position(participant, position);
        ctx.graph
            .set_source_volume(participant, voice_volume(distance, self.config.radius_m));
    }

    fn attempt<B: AudioBackend, S: TrackSubscriber>(
        &mut self,
        ctx: &mut VoiceContext<'_, B, S>,
        key: LinkKey,
        position: Position,
        distance: f64,
    ) {
        let (participant, track) = (&key.0, &key.1);
        self.links.insert(key.clone(), VoiceLinkState::Subscribing);

        match ctx.subscriber.subscribe(participant, track) {
            Ok(remote) => {
                if ctx.graph.add_source(&remote, position) {
                    ctx.graph
                        .set_source_volume(participant, voice_volume(distance, self.config.radius_m));
                }
                self.retries.record_success(&key);
                self.links.insert(key.clone(), VoiceLinkState::Subscribed);
                info!(participant = %participant, track = %track, distance, "Voice subscribed");
            },
            Err(e) if e.is_retryable() => self.schedule_retry(ctx.notices, key, &e),
            Err(e) => {
                debug!(participant = %participant, track = %track, "Voice subscribe rejected: {e}");
                self.retries.cancel(&key);
                self.links.remove(&key);
            },
        }
    }

    fn schedule_retry(&mut self, notices: &NoticeBus, key: LinkKey, error: &SignalingError) {
        match self.retries.record_failure(&key) {
            RetryDecision::Scheduled { retry, delay } => {
                debug!(participant = %key.0, track = %key.1, "Voice subscribe failed ({error}), retry {retry} in {delay:?}");
                self.links.insert(key, VoiceLinkState::RetryWait);
            },
            RetryDecision::Exhausted { attempts } => {
                warn!(participant = %key.0, track = %key.1, "Giving up on voice after {attempts} attempts: {error}");
                self.links.remove(&key);
                notices.publish(SessionNotice::VoiceUnavailable {
                    participant: key.0,
                    track: key.1,
                    attempts,
                });
            },
        }
    }

    /// Advance retry timers and re-attempt due links that are still wanted.
    pub fn update<B: AudioBackend, S: TrackSubscriber>(
        &mut self,
        dt: Duration,
        ctx: &mut VoiceContext<'_, B, S>,
    ) {
        let roster = ctx.roster;
        for key in self.retries.update(dt) {
            let Some(handle) = roster.get(&key.0) else {
                self.drop_link(&key);
                continue;
            };
            let distance = self.distance(ctx.local, handle.position());
            let still_published = ctx
                .subscriber
                .publications(&key.0)
                .is_ok_and(|pubs| pubs.iter().any(|p| p.name == key.1));
            if distance > self.config.radius_m || !still_published {
                debug!(participant = %key.0, track = %key.1, "Dropping stale voice retry");
                self.drop_link(&key);
                continue;
            }
            let position = handle.position();
            self.attempt(ctx, key, position, distance);
        }
    }

    fn drop_link(&mut self, key: &LinkKey) {
        self.retries.cancel(key);
        self.links.remove(key);
    }

    fn teardown<B: AudioBackend, S: TrackSubscriber>(
        &mut self,
        subscriber: &mut S,
        graph: &mut SpatialAudioGraph<B>,
        key: &LinkKey,
    ) {
        let was_subscribed = self.links.get(key) == Some(&VoiceLinkState::Subscribed);
        self.drop_link(key);
        if was_subscribed {
            if let Err(e) = subscriber.unsubscribe(&key.0, &key.1) {
                debug!(participant = %key.0, track = %key.1, "Unsubscribe failed: {e}");
            }
        }
        self.release_source_if_unused(graph, &key.0);
        debug!(participant = %key.0, track = %key.1, "Voice link closed");
    }

    fn release_source_if_unused<B: AudioBackend>(
        &self,
        graph: &mut SpatialAudioGraph<B>,
        participant: &ParticipantId,
    ) {
        let still_linked = self.links.iter().any(|((p, _), state)| {
            p == participant && *state == VoiceLinkState::Subscribed
        });
        if !still_linked {
            graph.remove_source(participant);
        }
    }

    /// The room reported a voice track as unsubscribed.
    pub fn on_track_unsubscribed<B: AudioBackend>(
        &mut self,
        graph: &mut SpatialAudioGraph<B>,
        participant: &ParticipantId,
        track: &TrackName,
    ) {
        let key = (participant.clone(), track.clone());
        if self.links.contains_key(&key) || self.retries.is_pending(&key) {
            self.drop_link(&key);
            self.release_source_if_unused(graph, participant);
        }
    }

    /// A participant left the room.
    pub fn on_participant_left<B: AudioBackend>(
        &mut self,
        graph: &mut SpatialAudioGraph<B>,
        participant: &ParticipantId,
    ) {
        self.links.retain(|(p, _), _| p != participant);
        self.retries.cancel_where(|(p, _)| p == participant);
        graph.remove_source(participant);
    }

    /// Tear down voice links targeted by a moderation notice. Returns true if any were.
    pub fn on_moderation<B: AudioBackend, S: TrackSubscriber>(
        &mut self,
        subscriber: &mut S,
        graph: &mut SpatialAudioGraph<B>,
        notice: &ModerationNotice,
    ) -> bool {
        let targeted: Vec<LinkKey> = self
            .links
            .keys()
            .filter(|(p, t)| notice.targets(p, t))
            .cloned()
            .collect();
        for key in &targeted {
            self.teardown(subscriber, graph, key);
        }
        !targeted.is_empty()
    }

    /// Drop every link and timer.
    pub fn teardown_all<B: AudioBackend, S: TrackSubscriber>(
        &mut self,
        subscriber: &mut S,
        graph: &mut SpatialAudioGraph<B>,
    ) {
        let keys: Vec<LinkKey> = self.links.keys().cloned().collect();
        for key in &keys {
            self.teardown(subscriber, graph, key);
        }
        let cancelled = self.retries.cancel_all();
        if cancelled > 0 {
            debug!("Cancelled {} voice retries", cancelled);
        }
    }

    /// State of a link, `None` when unsubscribed.
    #[must_use]
    pub fn link_state(&self, participant: &ParticipantId, track: &TrackName) -> Option<VoiceLinkState> {
        self.links
            .get(&(participant.clone(), track.clone()))
            .copied()
    }

    /// Whether any voice track of `participant` is subscribed.
    #[must_use]
    pub fn is_subscribed(&self, participant: &ParticipantId) -> bool {
        self.links
            .iter()
            .any(|((p, _), state)| p == participant && *state == VoiceLinkState::Subscribed)
    }

    /// Number of links in any state.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Number of links waiting on a retry timer.
    #[must_use]
    pub fn pending_retries(&self) -> usize {
        self.retries.len()
    }
}
