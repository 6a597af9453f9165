//! Music party membership.
//!
//! The local user joins at most one party at a time. Joining subscribes the
//! host's first playable `music-` track and plays it at full volume,
//! regardless of distance. A join that finds nothing to subscribe is retried with the
//! shared backoff policy; until it resolves the party is *pending*.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};
use vibes_audio::{AudioBackend, SpatialAudioGraph};
use vibes_common::{ModerationNotice, ParticipantId, SignalingError, TrackName};

use crate::events::{NoticeBus, SessionNotice};
use crate::retry::{RetryDecision, RetryPolicy, RetryScheduler};
use crate::roster::Roster;
use crate::signaling::TrackSubscriber;

/// Why a party join failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartyError {
    /// The party host is not in the room.
    #[error("Participant '{0}' not present")]
    ParticipantNotPresent(ParticipantId),

    /// Subscription failed and retrying will not help.
    #[error(transparent)]
    Signaling(#[from] SignalingError),

    /// Tracks were subscribed but could not be played.
    #[error("No audio output for party '{0}'")]
    AudioUnavailable(ParticipantId),
}

/// Result of [`MusicPartyManager::join_party`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Music is playing.
    Joined,
    /// Nothing could be subscribed yet; retrying in the background.
    Pending,
}

enum Attempt {
    Started,
    Retry(String),
    Failed(PartyError),
}

/// Tracks the joined (or pending) music party.
#[derive(Debug)]
pub struct MusicPartyManager {
    joined: Option<ParticipantId>,
    pending: Option<ParticipantId>,
    retries: RetryScheduler<ParticipantId>,
}

impl MusicPartyManager {
    /// Create a manager with no party.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self {
            joined: None,
            pending: None,
            retries: RetryScheduler::new(policy),
        }
    }

    /// Join `participant`'s party, leaving any other party first.
    pub fn join_party<B: AudioBackend, S: TrackSubscriber>(
        &mut self,
        participant: &ParticipantId,
        roster: &Roster,
        subscriber: &mut S,
        graph: &mut SpatialAudioGraph<B>,
        notices: &NoticeBus,
    ) -> Result<JoinOutcome, PartyError> {
        if self.joined.as_ref() == Some(participant) {
            return Ok(JoinOutcome::Joined);
        }
        if self.pending.as_ref() == Some(participant) {
            return Ok(JoinOutcome::Pending);
        }
        for other in [self.joined.clone(), self.pending.clone()].into_iter().flatten() {
            info!(from = %other, to = %participant, "Switching party");
            self.leave_party(&other, subscriber, graph);
        }

        if !roster.contains(participant) {
            return Err(PartyError::ParticipantNotPresent(participant.clone()));
        }

        match Self::attempt(participant, subscriber, graph) {
            Attempt::Started => {
                self.record_join(participant, notices);
                Ok(JoinOutcome::Joined)
            },
            Attempt::Retry(reason) => match self.retries.record_failure(participant) {
                RetryDecision::Scheduled { delay, .. } => {
                    debug!(participant = %participant, "Party join pending ({reason}), retry in {delay:?}");
                    self.pending = Some(participant.clone());
                    Ok(JoinOutcome::Pending)
                },
                RetryDecision::Exhausted { .. } => {
                    Err(PartyError::Signaling(SignalingError::Transient(reason)))
                },
            },
            Attempt::Failed(e) => Err(e),
        }
    }

    fn record_join(&mut self, participant: &ParticipantId, notices: &NoticeBus) {
        self.retries.record_success(participant);
        self.pending = None;
        self.joined = Some(participant.clone());
        info!(participant = %participant, "Joined music party");
        notices.publish(SessionNotice::PartyJoined {
            participant: participant.clone(),
        });
    }

    fn attempt<B: AudioBackend, S: TrackSubscriber>(
        participant: &ParticipantId,
        subscriber: &mut S,
        graph: &mut SpatialAudioGraph<B>,
    ) -> Attempt {
        let publications = match subscriber.publications(participant) {
            Ok(publications) => publications,
            Err(SignalingError::ParticipantNotFound(p)) => {
                return Attempt::Failed(PartyError::ParticipantNotPresent(p));
            },
            Err(e) if e.is_retryable() => return Attempt::Retry(e.to_string()),
            Err(e) => return Attempt::Failed(e.into()),
        };

        let mut started = false;
        let mut audio_failed = false;
        let mut last_error = None;
        for name in publications.iter().filter(|p| p.name.is_music()).map(|p| &p.name) {
            let resolved = match subscriber.subscribed_track(participant, name) {
                Some(track) => Ok(track),
                None => subscriber.subscribe(participant, name),
            };
            match resolved {
                Ok(track) if graph.start_music(&track) => {
                    started = true;
                    break;
                },
                Ok(_) => {
                    audio_failed = true;
                    unsubscribe_quietly(subscriber, participant, name);
                },
                Err(e) => {
                    debug!(participant = %participant, track = %name, "Music subscribe failed: {e}");
                    last_error = Some(e);
                },
            }
        }

        if started {
            Attempt::Started
        } else if audio_failed {
            Attempt::Failed(PartyError::AudioUnavailable(participant.clone()))
        } else {
            match last_error {
                Some(e) if !e.is_retryable() => Attempt::Failed(e.into()),
                Some(e) => Attempt::Retry(e.to_string()),
                None => Attempt::Retry("no music track published".into()),
            }
        }
    }

    /// Advance the pending join's retry timer.
    ///
    /// Room presence is checked by the retry itself, so a host whose metadata
    /// went invalid is still retried.
    pub fn update<B: AudioBackend, S: TrackSubscriber>(
        &mut self,
        dt: Duration,
        subscriber: &mut S,
        graph: &mut SpatialAudioGraph<B>,
        notices: &NoticeBus,
    ) {
        for participant in self.retries.update(dt) {
            if self.pending.as_ref() != Some(&participant) {
                self.retries.cancel(&participant);
                continue;
            }
            match Self::attempt(&participant, subscriber, graph) {
                Attempt::Started => self.record_join(&participant, notices),
                Attempt::Retry(reason) => {
                    if let RetryDecision::Exhausted { attempts } = self.retries.record_failure(&participant) {
                        warn!(participant = %participant, "Party join failed after {attempts} attempts: {reason}");
                        self.fail_pending(&participant, reason, notices);
                    }
                },
                Attempt::Failed(e) => {
                    warn!(participant = %participant, "Party join failed: {e}");
                    self.retries.cancel(&participant);
                    self.fail_pending(&participant, e.to_string(), notices);
                },
            }
        }
    }

    fn fail_pending(&mut self, participant: &ParticipantId, reason: String, notices: &NoticeBus) {
        self.pending = None;
        notices.publish(SessionNotice::PartyJoinFailed {
            participant: participant.clone(),
            reason,
        });
    }

    /// Leave a party. Idempotent; returns true if it was joined or pending.
    ///
    /// Only the host's music tracks are unsubscribed; voice stays under
    /// proximity control.
    pub fn leave_party<B: AudioBackend, S: TrackSubscriber>(
        &mut self,
        participant: &ParticipantId,
        subscriber: &mut S,
        graph: &mut SpatialAudioGraph<B>,
    ) -> bool {
        let was_member = self.forget(participant);
        graph.stop_music(participant);

        if let Ok(publications) = subscriber.publications(participant) {
            for publication in publications.iter().filter(|p| p.name.is_music()) {
                if subscriber.subscribed_track(participant, &publication.name).is_some() {
                    unsubscribe_quietly(subscriber, participant, &publication.name);
                }
            }
        }
        if was_member {
            info!(participant = %participant, "Left music party");
        }
        was_member
    }

    fn forget(&mut self, participant: &ParticipantId) -> bool {
        let mut was_member = false;
        if self.joined.as_ref() == Some(participant) {
            self.joined = None;
            was_member = true;
        }
        if self.pending.as_ref() == Some(participant) {
            self.pending = None;
            was_member = true;
        }
        self.retries.cancel(participant);
        was_member
    }

    /// The party host disconnected.
    pub fn on_participant_left<B: AudioBackend>(
        &mut self,
        graph: &mut SpatialAudioGraph<B>,
        participant: &ParticipantId,
    ) {
        if self.forget(participant) {
            info!(participant = %participant, "Party host left");
        }
        graph.stop_music(participant);
    }

    /// The room reported a track as unsubscribed.
    pub fn on_track_unsubscribed<B: AudioBackend>(
        &mut self,
        graph: &mut SpatialAudioGraph<B>,
        participant: &ParticipantId,
        track: &TrackName,
    ) {
        if track.is_music() && self.joined.as_ref() == Some(participant) {
            self.joined = None;
            graph.stop_music(participant);
            info!(participant = %participant, track = %track, "Party music ended");
        }
    }

    /// Apply a moderation notice. Returns true if it ended our party.
    pub fn on_moderation<B: AudioBackend, S: TrackSubscriber>(
        &mut self,
        notice: &ModerationNotice,
        subscriber: &mut S,
        graph: &mut SpatialAudioGraph<B>,
        notices: &NoticeBus,
    ) -> bool {
        let party = self.joined.as_ref().or(self.pending.as_ref());
        if party != Some(&notice.participant) {
            return false;
        }
        if notice.track.as_ref().is_some_and(|t| !t.is_music()) {
            return false;
        }

        self.leave_party(&notice.participant, subscriber, graph);
        warn!(participant = %notice.participant, "Party ended by moderator ({})", notice.kind.display_name());
        notices.publish(SessionNotice::ForcedLeave {
            participant: notice.participant.clone(),
            kind: notice.kind,
        });
        true
    }

    /// Whether `participant`'s party is joined.
    #[must_use]
    pub fn has_joined(&self, participant: &ParticipantId) -> bool {
        self.joined.as_ref() == Some(participant)
    }

    /// The joined party, if any.
    #[must_use]
    pub fn current_party(&self) -> Option<&ParticipantId> {
        self.joined.as_ref()
    }

    /// The party being retried, if any.
    #[must_use]
    pub fn pending_party(&self) -> Option<&ParticipantId> {
        self.pending.as_ref()
    }
}

fn unsubscribe_quietly<S: TrackSubscriber>(subscriber: &mut S, participant: &ParticipantId, track: &TrackName) {
    if let Err(e) = subscriber.unsubscribe(participant, track) {
        debug!(participant = %participant, track = %track, "Unsubscribe failed: {e}");
    }
}
