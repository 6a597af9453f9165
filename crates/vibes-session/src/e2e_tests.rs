//! End-to-end tests for a room session.
//!
//! These drive a [`SpatialSession`] the way a host would: roster snapshots,
//! position updates, frame ticks and UI actions, against the in-memory room
//! and the headless audio backend.

#![cfg(test)]

use std::time::Duration;

use vibes_audio::{
    AudioBackend, ContextState, GestureKind, HeadlessBackend, HeadlessFailures, ProjectionMode,
    SpatialConfig, TrackedResources, METERS_PER_DEGREE,
};
use vibes_common::{
    MediaStreamId, ModerationKind, ModerationNotice, ParticipantId, ParticipantMetadata, Position,
    TrackName,
};

use crate::events::SessionNotice;
use crate::party::JoinOutcome;
use crate::roster::Roster;
use crate::session::{SessionConfig, SpatialSession};
use crate::signaling::InMemoryRoom;

type Session = SpatialSession<HeadlessBackend, InMemoryRoom>;

/// A connected local user at the origin plus the room they share.
struct Harness {
    session: Session,
    room: InMemoryRoom,
    roster: Roster,
}

impl Harness {
    fn new() -> Self {
        Self::with(HeadlessBackend::new(), SessionConfig::default())
    }

    fn with(backend: HeadlessBackend, config: SessionConfig) -> Self {
        let room = InMemoryRoom::new();
        room.join("me");
        let mut session = SpatialSession::new("me", backend, room.clone(), config);
        session.connect();
        Self {
            session,
            room,
            roster: Roster::new(),
        }
    }

    fn place(&mut self, id: &str, lat: f64, lon: f64) -> ParticipantId {
        let participant = ParticipantId::new(id);
        self.roster.upsert(
            participant.clone(),
            ParticipantMetadata::new(id, Position::new(lat, lon)),
        );
        self.session.sync_roster(&self.roster);
        participant
    }

    fn host_party(&mut self, id: &str, lat: f64, lon: f64) -> ParticipantId {
        self.room.join(id);
        self.room.publish(id, "music-default");
        self.roster.upsert(
            ParticipantId::new(id),
            ParticipantMetadata::new(id, Position::new(lat, lon)).with_party("Rooftop"),
        );
        self.session.sync_roster(&self.roster);
        ParticipantId::new(id)
    }

    fn tick(&mut self, seconds: u64) {
        for _ in 0..seconds {
            self.session.update(Duration::from_secs(1));
        }
    }

    fn backend(&self) -> &HeadlessBackend {
        self.session.graph().backend()
    }
}

fn mic() -> TrackName {
    TrackName::new("mic")
}

fn music() -> TrackName {
    TrackName::new("music-default")
}

/// Proximity voice across real GPS coordinates
mod proximity_tests {
    use super::*;

    #[test]
    fn e2e_voice_follows_great_circle_radius() {
        let mut h = Harness::new();
        h.room.join("ana");
        h.room.publish("ana", "mic");

        // ~33 m east
        let ana = h.place("ana", 0.0, 0.0003);
        assert!(h.session.graph().has_source(&ana), "Publisher within 50 m should be heard");
        assert!(h.room.is_subscribed(&ana, &mic()));

        // ~111 m east
        h.place("ana", 0.0, 0.001);
        assert!(!h.session.graph().has_source(&ana), "Publisher beyond 50 m should be dropped");
        assert!(!h.room.is_subscribed(&ana, &mic()));
        assert_eq!(h.backend().element_count(), 0, "Backing element should be released");
    }

    #[test]
    fn e2e_voice_follows_linear_radius() {
        let config = SessionConfig {
            spatial: SpatialConfig::default().with_projection(ProjectionMode::linear(METERS_PER_DEGREE)),
            ..SessionConfig::default()
        };
        let mut h = Harness::with(HeadlessBackend::new(), config);
        h.room.join("ana");
        h.room.publish("ana", "mic");

        let ana = h.place("ana", 0.0, 0.0003);
        assert!(h.session.graph().has_source(&ana));

        h.place("ana", 0.0, 0.001);
        assert!(!h.session.graph().has_source(&ana));
    }

    #[test]
    fn e2e_local_movement_reevaluates() {
        let mut h = Harness::new();
        h.room.join("ana");
        h.room.publish("ana", "mic");
        let ana = h.place("ana", 0.0, 0.001);
        assert!(!h.session.graph().has_source(&ana));

        // Walk toward ana until within ~22 m.
        h.session.set_local_position(Position::new(0.0, 0.0008));
        assert!(h.session.graph().has_source(&ana), "Moving closer should subscribe");
        assert_eq!(h.session.graph().listener_position(), Position::new(0.0, 0.0008));

        h.session.set_local_position(Position::ORIGIN);
        assert!(!h.session.graph().has_source(&ana), "Moving away should unsubscribe");
    }

    #[test]
    fn e2e_volume_falls_with_distance() {
        let mut h = Harness::new();
        h.room.join("ana");
        h.room.publish("ana", "mic");

        let mut last = f32::INFINITY;
        for step in 0..5 {
            // 0, ~11, ~22, ~33, ~44 m
            let ana = h.place("ana", 0.0, 0.0001 * f64::from(step));
            let volume = h.session.graph().source_volume(&ana).expect("in range");
            assert!(volume < last, "Volume should fall with distance");
            last = volume;
        }
        assert!(last > 0.0);
    }

    #[test]
    fn e2e_departed_participant_is_released() {
        let mut h = Harness::new();
        h.room.join("ana");
        h.room.publish("ana", "mic");
        let ana = h.place("ana", 0.0, 0.0001);
        assert!(h.session.graph().has_source(&ana));

        h.roster.remove(&ana);
        h.session.sync_roster(&h.roster);
        assert!(!h.session.graph().has_source(&ana));
        assert_eq!(h.session.voice().link_count(), 0);
        assert!(!h.room.is_subscribed(&ana, &mic()));
    }

    #[test]
    fn e2e_invalid_metadata_unsubscribes_voice() {
        let mut h = Harness::new();
        h.room.join("ana");
        h.room.publish("ana", "mic");
        let ana = h.place("ana", 0.0, 0.0001);
        assert!(h.room.is_subscribed(&ana, &mic()));

        // Still in the room, but without a position.
        assert!(h.roster.apply_metadata(&ana, r#"{"username":"ana"}"#).is_err());
        h.session.sync_roster(&h.roster);
        assert!(!h.session.graph().has_source(&ana));
        assert_eq!(h.session.voice().link_state(&ana, &mic()), None);
        assert_eq!(h.room.subscription_count(), 0, "No subscription may outlive its link");

        h.roster
            .apply_metadata(&ana, r#"{"username":"ana","position":{"x":0.0,"y":0.0001}}"#)
            .expect("valid");
        h.session.sync_roster(&h.roster);
        assert!(h.session.graph().has_source(&ana));
        assert!(h.room.is_subscribed(&ana, &mic()));

        h.session.disconnect();
        assert_eq!(h.room.subscription_count(), 0);
    }
}

/// Voice and music tracks take separate paths
mod segregation_tests {
    use super::*;

    #[test]
    fn e2e_music_never_enters_spatial_path() {
        let mut h = Harness::new();
        h.room.join("ana");
        h.room.publish("ana", "mic");
        h.room.publish("ana", "music-party1");

        let ana = h.place("ana", 0.0, 0.0001);
        let source = h.session.graph().source(&ana).expect("voice source");
        assert_eq!(source.track, mic());
        assert!(!h.room.is_subscribed(&ana, &TrackName::new("music-party1")));
        assert!(!h.session.graph().has_music(&ana));
    }

    #[test]
    fn e2e_unsubscribed_voice_track_releases_source() {
        let mut h = Harness::new();
        h.room.join("ana");
        h.room.publish("ana", "mic");
        let ana = h.place("ana", 0.0, 0.0001);

        h.session.on_track_unsubscribed(&ana, &mic());
        assert!(!h.session.graph().has_source(&ana));
    }
}

/// Music party join, leave and exclusivity
mod party_tests {
    use super::*;

    #[test]
    fn e2e_join_leave_round_trip() {
        let mut h = Harness::new();
        // Far beyond the voice radius; parties ignore distance.
        let dj = h.host_party("dj", 1.0, 1.0);

        assert_eq!(h.session.join_party(&dj), Ok(JoinOutcome::Joined));
        assert_eq!(h.session.current_party(), Some(&dj));
        assert!(h.session.graph().has_music(&dj));
        assert_eq!(h.backend().playing_count(), 1);

        assert!(h.session.leave_party(&dj));
        assert_eq!(h.session.current_party(), None);
        assert_eq!(h.session.graph().music_element(&dj), None);
        assert_eq!(h.backend().element_count(), 0, "No backing element should remain");
        assert!(!h.room.is_subscribed(&dj, &music()));

        assert!(!h.session.leave_party(&dj), "Leaving twice is a no-op");
    }

    #[test]
    fn e2e_joining_second_party_leaves_first() {
        let mut h = Harness::new();
        let a = h.host_party("dj-a", 1.0, 1.0);
        let b = h.host_party("dj-b", 2.0, 2.0);

        h.session.join_party(&a).expect("join a");
        h.session.join_party(&b).expect("join b");

        assert_eq!(h.session.current_party(), Some(&b));
        assert!(!h.session.has_joined(&a));
        assert!(!h.session.graph().has_music(&a));
        assert!(!h.room.is_subscribed(&a, &music()));
        assert!(h.room.is_subscribed(&b, &music()));
        assert_eq!(h.backend().element_count(), 1);
    }

    #[test]
    fn e2e_party_leave_keeps_proximity_voice() {
        let mut h = Harness::new();
        h.room.join("dj");
        h.room.publish("dj", "mic");
        let dj = h.host_party("dj", 0.0, 0.0001);
        assert!(h.session.graph().has_source(&dj));

        h.session.join_party(&dj).expect("join");
        h.session.leave_party(&dj);

        assert!(h.session.graph().has_source(&dj), "Voice stays under proximity control");
        assert!(h.room.is_subscribed(&dj, &mic()));
    }

    #[test]
    fn e2e_party_survives_invalid_host_metadata() {
        let mut h = Harness::new();
        h.room.join("dj");
        h.room.publish("dj", "mic");
        let dj = h.host_party("dj", 0.0, 0.0001);
        h.session.join_party(&dj).expect("join");
        assert_eq!(h.room.subscription_count(), 2);

        assert!(h.roster.apply_metadata(&dj, "{}").is_err());
        h.session.sync_roster(&h.roster);
        assert_eq!(h.session.current_party(), Some(&dj), "The host is still in the room");
        assert!(h.session.graph().has_music(&dj));
        assert!(h.room.is_subscribed(&dj, &music()));
        assert!(!h.session.graph().has_source(&dj), "Voice needs a position");
        assert!(!h.room.is_subscribed(&dj, &mic()));

        h.roster
            .apply_metadata(
                &dj,
                r#"{"username":"dj","position":{"x":0.0,"y":0.0001},"isPublishingMusic":true}"#,
            )
            .expect("valid");
        h.session.sync_roster(&h.roster);
        assert!(h.session.has_joined(&dj));
        assert!(h.session.graph().has_source(&dj));

        h.session.disconnect();
        assert_eq!(h.room.subscription_count(), 0);
    }

    #[test]
    fn e2e_host_disconnect_ends_party() {
        let mut h = Harness::new();
        let dj = h.host_party("dj", 1.0, 1.0);
        h.session.join_party(&dj).expect("join");

        h.room.leave(&dj);
        h.session.on_participant_disconnected(&dj);

        assert_eq!(h.session.current_party(), None);
        assert_eq!(h.backend().element_count(), 0);
    }
}

/// Subscription retries with 1s/2s/4s backoff
mod retry_tests {
    use super::*;

    #[test]
    fn e2e_voice_retry_ceiling() {
        let mut h = Harness::new();
        h.room.join("ana");
        h.room.publish("ana", "mic");
        h.room.fail_subscribes(&ParticipantId::new("ana"), &mic(), 100);

        let ana = h.place("ana", 0.0, 0.0001);
        assert_eq!(h.room.subscribe_calls(&ana, &mic()), 1);

        h.tick(1);
        assert_eq!(h.room.subscribe_calls(&ana, &mic()), 2, "First retry after 1s");
        h.tick(2);
        assert_eq!(h.room.subscribe_calls(&ana, &mic()), 3, "Second retry after 2s more");
        h.tick(3);
        assert_eq!(h.room.subscribe_calls(&ana, &mic()), 3, "Third retry not before 4s");
        h.tick(1);
        assert_eq!(h.room.subscribe_calls(&ana, &mic()), 4);

        assert_eq!(h.session.voice().pending_retries(), 0, "No timer should remain");
        assert!(h.session.drain_notices().contains(&SessionNotice::VoiceUnavailable {
            participant: ana.clone(),
            track: mic(),
            attempts: 4,
        }));

        h.tick(30);
        assert_eq!(h.room.subscribe_calls(&ana, &mic()), 4, "Ticks alone never retry again");
        assert!(!h.session.graph().has_source(&ana));
    }

    #[test]
    fn e2e_voice_retry_recovers() {
        let mut h = Harness::new();
        h.room.join("ana");
        h.room.publish("ana", "mic");
        h.room.fail_subscribes(&ParticipantId::new("ana"), &mic(), 2);

        let ana = h.place("ana", 0.0, 0.0001);
        h.tick(3);

        assert!(h.session.graph().has_source(&ana));
        assert_eq!(h.session.voice().pending_retries(), 0);
        assert!(h.session.drain_notices().is_empty());
    }

    #[test]
    fn e2e_retry_cancelled_when_out_of_range() {
        let mut h = Harness::new();
        h.room.join("ana");
        h.room.publish("ana", "mic");
        h.room.fail_subscribes(&ParticipantId::new("ana"), &mic(), 100);

        let ana = h.place("ana", 0.0, 0.0001);
        h.place("ana", 0.0, 0.01);
        assert_eq!(h.session.voice().pending_retries(), 0);

        h.tick(10);
        assert_eq!(h.room.subscribe_calls(&ana, &mic()), 1);
    }

    #[test]
    fn e2e_party_join_retries_then_joins() {
        let mut h = Harness::new();
        let dj = h.host_party("dj", 1.0, 1.0);
        h.room.fail_subscribes(&dj, &music(), 1);

        assert_eq!(h.session.join_party(&dj), Ok(JoinOutcome::Pending));
        h.tick(1);

        assert_eq!(h.session.current_party(), Some(&dj));
        assert!(h
            .session
            .drain_notices()
            .contains(&SessionNotice::PartyJoined { participant: dj.clone() }));
    }
}

/// Moderator actions
mod moderation_tests {
    use super::*;

    #[test]
    fn e2e_moderated_party_forces_leave() {
        let mut h = Harness::new();
        let dj = h.host_party("dj", 1.0, 1.0);
        h.session.join_party(&dj).expect("join");
        h.session.drain_notices();

        h.session
            .on_moderation_message(
                r#"{"type":"admin_track_unpublished","participantIdentity":"dj","trackName":"music-default"}"#,
            )
            .expect("valid notice");

        assert_eq!(h.session.current_party(), None);
        assert_eq!(
            h.session.drain_notices(),
            vec![SessionNotice::ForcedLeave {
                participant: dj,
                kind: ModerationKind::TrackUnpublished,
            }]
        );
    }

    #[test]
    fn e2e_moderated_voice_is_dropped() {
        let mut h = Harness::new();
        h.room.join("ana");
        h.room.publish("ana", "mic");
        let ana = h.place("ana", 0.0, 0.0001);

        let notice = ModerationNotice::new(ModerationKind::TrackMuted, ana.clone(), Some(mic()));
        h.session.on_moderation_notice(&notice);

        assert!(!h.session.graph().has_source(&ana));
        assert_eq!(
            h.session.drain_notices(),
            vec![SessionNotice::VoiceModerated {
                participant: ana,
                track: Some(mic()),
                kind: ModerationKind::TrackMuted,
            }]
        );
    }

    #[test]
    fn e2e_unrelated_moderation_is_quiet() {
        let mut h = Harness::new();
        let dj = h.host_party("dj", 1.0, 1.0);
        h.session.join_party(&dj).expect("join");
        h.session.drain_notices();

        let notice = ModerationNotice::new(ModerationKind::TrackMuted, ParticipantId::new("other"), None);
        h.session.on_moderation_notice(&notice);

        assert_eq!(h.session.current_party(), Some(&dj));
        assert!(h.session.drain_notices().is_empty());
    }
}

/// Autoplay and gesture handling
mod gesture_tests {
    use super::*;

    #[test]
    fn e2e_suspended_context_resumes_on_gesture() {
        let backend = HeadlessBackend::with_failures(HeadlessFailures {
            start_suspended: true,
            resume: true,
            ..HeadlessFailures::default()
        });
        let mut h = Harness::with(backend, SessionConfig::default());
        assert!(h.session.graph().is_initialized());
        assert!(h.session.wants_gesture_listeners());

        // The platform allows resuming once the user interacts.
        h.session.backend_mut().failures.resume = false;
        h.session.handle_user_gesture(GestureKind::Click);
        assert_eq!(h.backend().context_state(), Some(ContextState::Running));
        assert!(!h.session.wants_gesture_listeners());
    }

    #[test]
    fn e2e_no_audio_output_keeps_session_usable() {
        let backend = HeadlessBackend::with_failures(HeadlessFailures {
            context_creation: true,
            ..HeadlessFailures::default()
        });
        let mut h = Harness::with(backend, SessionConfig::default());
        assert!(h.session.is_connected());
        assert!(!h.session.graph().is_initialized());

        h.room.join("ana");
        h.room.publish("ana", "mic");
        let ana = h.place("ana", 0.0, 0.0001);
        assert!(!h.session.graph().has_source(&ana));
    }
}

/// Nothing outlives the session
mod cleanup_tests {
    use super::*;

    #[test]
    fn e2e_disconnect_releases_everything() {
        let mut h = Harness::new();
        h.room.join("ana");
        h.room.publish("ana", "mic");
        h.place("ana", 0.0, 0.0001);
        let dj = h.host_party("dj", 1.0, 1.0);
        h.session.join_party(&dj).expect("join");

        h.session.register_resource(
            "upload",
            TrackedResources::default().with_media_stream(MediaStreamId::new(99)),
        );
        h.session
            .update_resource("upload", TrackedResources::default().with_object_url("blob:upload"));
        assert!(h.session.has_resource("upload"));

        h.session.disconnect();

        assert_eq!(h.room.subscription_count(), 0, "Every subscription should be released");
        assert_eq!(h.backend().element_count(), 0);
        assert_eq!(h.backend().node_count(), 0);
        assert_eq!(h.backend().playing_count(), 0);
        assert!(h.backend().is_stream_stopped(MediaStreamId::new(99)));
        assert_eq!(h.backend().revoked_urls(), ["blob:upload".to_string()]);
        assert!(h.session.graph().resources().is_empty());
        assert_eq!(h.backend().context_state(), Some(ContextState::Closed));
        assert_eq!(h.session.current_party(), None);
    }

    #[test]
    fn e2e_drop_releases_subscriptions() {
        let room = InMemoryRoom::new();
        room.join("ana");
        room.publish("ana", "mic");
        room.join("dj");
        room.publish("dj", "music-default");

        {
            let mut session: Session =
                SpatialSession::new("me", HeadlessBackend::new(), room.clone(), SessionConfig::default());
            session.connect();
            let mut roster = Roster::new();
            roster.upsert(
                ParticipantId::new("ana"),
                ParticipantMetadata::new("ana", Position::new(0.0, 0.0001)),
            );
            roster.upsert(
                ParticipantId::new("dj"),
                ParticipantMetadata::new("dj", Position::new(1.0, 1.0)).with_party("Rooftop"),
            );
            session.sync_roster(&roster);
            session.join_party(&ParticipantId::new("dj")).expect("join");
            assert_eq!(room.subscription_count(), 2);
        }

        assert_eq!(room.subscription_count(), 0);
    }

    #[test]
    fn e2e_pending_retries_die_with_session() {
        let room = InMemoryRoom::new();
        room.join("ana");
        room.publish("ana", "mic");
        room.fail_subscribes(&ParticipantId::new("ana"), &mic(), 100);

        let mut session: Session =
            SpatialSession::new("me", HeadlessBackend::new(), room.clone(), SessionConfig::default());
        session.connect();
        let mut roster = Roster::new();
        roster.upsert(
            ParticipantId::new("ana"),
            ParticipantMetadata::new("ana", Position::new(0.0, 0.0001)),
        );
        session.sync_roster(&roster);
        assert_eq!(session.voice().pending_retries(), 1);

        session.disconnect();
        assert_eq!(session.voice().pending_retries(), 0);
        session.update(Duration::from_secs(10));
        assert_eq!(room.subscribe_calls(&ParticipantId::new("ana"), &mic()), 1);
    }
}
