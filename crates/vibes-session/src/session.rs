//! Per-room session facade.
//!
//! A [`SpatialSession`] is created when the local user connects to a room and
//! dropped (or [`SpatialSession::disconnect`]ed) when they leave. It owns the
//! audio graph, the room client and both managers; the host UI talks to it
//! through named methods and drains [`SessionNotice`]s for display.
//!
//! ```text
//! host UI ──▶ set_local_position / sync_roster / update(dt) / join_party ...
//!                         │
//!            ┌────────────┴─────────────┐
//!            ▼                          ▼
//!  ProximityVoiceManager        MusicPartyManager
//!            │                          │
//!            └──────▶ TrackSubscriber ◀─┘
//!            └──────▶ SpatialAudioGraph ◀┘
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vibes_audio::{AudioBackend, GestureKind, SpatialAudioGraph, SpatialConfig, TrackedResources};
use vibes_common::{ModerationError, ModerationNotice, ParticipantId, Position, TrackName};

use crate::events::{NoticeBus, SessionNotice};
use crate::party::{JoinOutcome, MusicPartyManager, PartyError};
use crate::proximity::{ProximityConfig, ProximityVoiceManager, VoiceContext};
use crate::retry::RetryPolicy;
use crate::roster::Roster;
use crate::signaling::TrackSubscriber;

/// Every tunable of a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Audio graph settings.
    pub spatial: SpatialConfig,
    /// Voice radius.
    pub proximity: ProximityConfig,
    /// Backoff shared by voice and party subscriptions.
    pub retry: RetryPolicy,
    /// Notice queue capacity.
    pub notice_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            spatial: SpatialConfig::default(),
            proximity: ProximityConfig::default(),
            retry: RetryPolicy::default(),
            notice_capacity: 256,
        }
    }
}

/// Spatial audio for one room connection.
pub struct SpatialSession<B: AudioBackend, S: TrackSubscriber> {
    local_identity: ParticipantId,
    local_position: Position,
    graph: SpatialAudioGraph<B>,
    subscriber: S,
    roster: Roster,
    voice: ProximityVoiceManager,
    party: MusicPartyManager,
    notices: NoticeBus,
    connected: bool,
}

impl<B: AudioBackend, S: TrackSubscriber> SpatialSession<B, S> {
    /// Create a session for `local_identity`. Nothing happens until [`Self::connect`].
    pub fn new(
        local_identity: impl Into<ParticipantId>,
        backend: B,
        subscriber: S,
        config: SessionConfig,
    ) -> Self {
        Self {
            local_identity: local_identity.into(),
            local_position: Position::ORIGIN,
            graph: SpatialAudioGraph::new(backend, config.spatial),
            subscriber,
            roster: Roster::new(),
            voice: ProximityVoiceManager::new(
                config.proximity,
                config.spatial.projection,
                config.retry,
            ),
            party: MusicPartyManager::new(config.retry),
            notices: NoticeBus::new(config.notice_capacity),
            connected: false,
        }
    }

    /// Bring up audio and start evaluating proximity.
    ///
    /// Returns whether audio is available. The session is usable either way:
    /// without audio, subscriptions still follow proximity and the graph can
    /// be retried with [`Self::retry_audio`].
    pub fn connect(&mut self) -> bool {
        let audio = self.graph.initialize();
        self.connected = true;
        info!(local = %self.local_identity, audio, "Session connected");
        self.evaluate();
        audio
    }

    /// Retry audio initialization, routing any already subscribed voices.
    pub fn retry_audio(&mut self) -> bool {
        let audio = self.graph.initialize();
        if audio {
            self.evaluate();
        }
        audio
    }

    /// Whether [`Self::connect`] was called and [`Self::disconnect`] was not.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    fn evaluate(&mut self) {
        if !self.connected {
            return;
        }
        let mut ctx = VoiceContext {
            local: self.local_position,
            roster: &self.roster,
            subscriber: &mut self.subscriber,
            graph: &mut self.graph,
            notices: &self.notices,
        };
        self.voice.evaluate(&mut ctx);
    }

    /// The local user moved.
    pub fn set_local_position(&mut self, position: Position) {
        if !position.is_finite() {
            debug!("Ignoring non-finite local position");
            return;
        }
        self.local_position = position;
        self.graph.update_listener_position(position);
        self.evaluate();
    }

    /// Replace the roster snapshot with the host's current one.
    ///
    /// A participant missing from the new snapshot (no valid metadata) is
    /// still in the room: their voice links are unsubscribed as out of range,
    /// while a party they host keeps playing. Only
    /// [`Self::on_participant_disconnected`] ends it.
    pub fn sync_roster(&mut self, roster: &Roster) {
        for handle in self.roster.iter().filter(|h| !roster.contains(&h.identity)) {
            debug!(participant = %handle.identity, "Participant left the roster");
        }

        self.roster = roster.clone();
        if self.roster.remove(&self.local_identity).is_some() {
            debug!("Local participant excluded from roster");
        }
        self.evaluate();
    }

    /// Advance timers: gesture expiry, voice retries and pending party joins.
    pub fn update(&mut self, dt: Duration) {
        if !self.connected {
            return;
        }
        self.graph.update(dt);
        let mut ctx = VoiceContext {
            local: self.local_position,
            roster: &self.roster,
            subscriber: &mut self.subscriber,
            graph: &mut self.graph,
            notices: &self.notices,
        };
        self.voice.update(dt, &mut ctx);
        self.party
            .update(dt, &mut self.subscriber, &mut self.graph, &self.notices);
    }

    /// Join a music party, leaving the current one first.
    pub fn join_party(&mut self, participant: &ParticipantId) -> Result<JoinOutcome, PartyError> {
        self.party.join_party(
            participant,
            &self.roster,
            &mut self.subscriber,
            &mut self.graph,
            &self.notices,
        )
    }

    /// Leave a music party. Idempotent.
    pub fn leave_party(&mut self, participant: &ParticipantId) -> bool {
        self.party
            .leave_party(participant, &mut self.subscriber, &mut self.graph)
    }

    /// Whether `participant`'s party is joined.
    #[must_use]
    pub fn has_joined(&self, participant: &ParticipantId) -> bool {
        self.party.has_joined(participant)
    }

    /// The joined party.
    #[must_use]
    pub fn current_party(&self) -> Option<&ParticipantId> {
        self.party.current_party()
    }

    /// The room reported a track as unsubscribed.
    pub fn on_track_unsubscribed(&mut self, participant: &ParticipantId, track: &TrackName) {
        if track.is_music() {
            self.party
                .on_track_unsubscribed(&mut self.graph, participant, track);
        } else {
            self.voice
                .on_track_unsubscribed(&mut self.graph, participant, track);
        }
    }

    /// A remote participant left the room.
    pub fn on_participant_disconnected(&mut self, participant: &ParticipantId) {
        self.roster.remove(participant);
        self.voice.on_participant_left(&mut self.graph, participant);
        self.party.on_participant_left(&mut self.graph, participant);
        info!(participant = %participant, "Participant disconnected");
    }

    /// Apply a moderation notice.
    pub fn on_moderation_notice(&mut self, notice: &ModerationNotice) {
        if notice.participant == self.local_identity {
            info!(track = ?notice.track, "Own track moderated ({})", notice.kind.display_name());
            self.notices.publish(SessionNotice::LocalTrackModerated {
                track: notice.track.clone(),
                kind: notice.kind,
            });
            return;
        }

        self.party.on_moderation(
            notice,
            &mut self.subscriber,
            &mut self.graph,
            &self.notices,
        );
        if self
            .voice
            .on_moderation(&mut self.subscriber, &mut self.graph, notice)
        {
            self.notices.publish(SessionNotice::VoiceModerated {
                participant: notice.participant.clone(),
                track: notice.track.clone(),
                kind: notice.kind,
            });
        }
    }

    /// Parse and apply a moderation data message.
    pub fn on_moderation_message(&mut self, json: &str) -> Result<(), ModerationError> {
        let notice = ModerationNotice::parse(json)?;
        self.on_moderation_notice(&notice);
        Ok(())
    }

    /// Forward a user gesture to resume blocked playback.
    pub fn handle_user_gesture(&mut self, kind: GestureKind) -> usize {
        self.graph.handle_user_gesture(kind)
    }

    /// Whether the host should listen for gestures.
    #[must_use]
    pub fn wants_gesture_listeners(&self) -> bool {
        self.graph.wants_gesture_listeners()
    }

    /// Track a host-created resource for release on disconnect.
    pub fn register_resource(&mut self, id: impl Into<String>, resources: TrackedResources) {
        self.graph.register_resource(id, resources);
    }

    /// Merge into a host-created resource entry.
    pub fn update_resource(&mut self, id: impl Into<String>, patch: TrackedResources) {
        self.graph.update_resource(id, patch);
    }

    /// Release a tracked resource now.
    pub fn cleanup_resource(&mut self, id: &str) -> bool {
        self.graph.cleanup_resource(id)
    }

    /// Whether a resource is tracked.
    #[must_use]
    pub fn has_resource(&self, id: &str) -> bool {
        self.graph.has_resource(id)
    }

    /// Take every pending notice.
    pub fn drain_notices(&self) -> Vec<SessionNotice> {
        self.notices.drain()
    }

    /// Local identity.
    #[must_use]
    pub const fn local_identity(&self) -> &ParticipantId {
        &self.local_identity
    }

    /// Local position.
    #[must_use]
    pub const fn local_position(&self) -> Position {
        self.local_position
    }

    /// Roster snapshot in use.
    #[must_use]
    pub const fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Audio graph.
    #[must_use]
    pub const fn graph(&self) -> &SpatialAudioGraph<B> {
        &self.graph
    }

    /// Platform audio backend, for host adapters.
    pub fn backend_mut(&mut self) -> &mut B {
        self.graph.backend_mut()
    }

    /// Room client.
    #[must_use]
    pub const fn subscriber(&self) -> &S {
        &self.subscriber
    }

    /// Voice manager.
    #[must_use]
    pub const fn voice(&self) -> &ProximityVoiceManager {
        &self.voice
    }

    /// Party manager.
    #[must_use]
    pub const fn party(&self) -> &MusicPartyManager {
        &self.party
    }

    /// Leave the room: end the party, drop every voice link and timer,
    /// release every tracked resource and close audio. Idempotent.
    pub fn disconnect(&mut self) {
        if !self.connected && !self.graph.is_initialized() {
            return;
        }
        if let Some(party) = self.party.current_party().or(self.party.pending_party()).cloned() {
            self.party
                .leave_party(&party, &mut self.subscriber, &mut self.graph);
        }
        self.voice
            .teardown_all(&mut self.subscriber, &mut self.graph);
        self.graph.destroy();
        self.connected = false;
        info!(local = %self.local_identity, "Session disconnected");
    }
}

impl<B: AudioBackend, S: TrackSubscriber> Drop for SpatialSession<B, S> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vibes_audio::HeadlessBackend;

    use crate::signaling::InMemoryRoom;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert!((config.proximity.radius_m - 50.0).abs() < f64::EPSILON);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.spatial.sample_rate, 44_100);
    }

    #[test]
    fn test_config_json_round_trip_with_partial_input() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"proximity":{"radius_m":30.0}}"#).expect("parse");
        assert!((config.proximity.radius_m - 30.0).abs() < f64::EPSILON);
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_local_participant_is_not_tracked() {
        let room = InMemoryRoom::new();
        let mut session =
            SpatialSession::new("me", HeadlessBackend::new(), room, SessionConfig::default());
        session.connect();

        let mut roster = Roster::new();
        roster
            .apply_metadata(&ParticipantId::new("me"), r#"{"position":{"x":0.0,"y":0.0}}"#)
            .expect("valid");
        session.sync_roster(&roster);
        assert!(session.roster().is_empty());
    }

    #[test]
    fn test_local_moderation_is_surfaced() {
        let mut session = SpatialSession::new(
            "me",
            HeadlessBackend::new(),
            InMemoryRoom::new(),
            SessionConfig::default(),
        );
        session.connect();
        session
            .on_moderation_message(r#"{"type":"admin_track_muted","participantIdentity":"me","trackName":"mic"}"#)
            .expect("valid notice");

        assert_eq!(
            session.drain_notices(),
            vec![SessionNotice::LocalTrackModerated {
                track: Some(TrackName::new("mic")),
                kind: vibes_common::ModerationKind::TrackMuted,
            }]
        );
        assert!(session.on_moderation_message(r#"{"type":"chat"}"#).is_err());
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut session = SpatialSession::new(
            "me",
            HeadlessBackend::new(),
            InMemoryRoom::new(),
            SessionConfig::default(),
        );
        assert!(session.connect());
        session.disconnect();
        assert!(!session.is_connected());
        assert!(!session.graph().is_initialized());
        session.disconnect();
    }
}
