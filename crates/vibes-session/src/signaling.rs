//! Track subscription seam to the media server.
//!
//! [`TrackSubscriber`] is everything the managers need from the room client:
//! list a participant's audio publications, subscribe to one (getting back the
//! media stream to route), and unsubscribe. [`InMemoryRoom`] implements it
//! over shared state so a test or the simulator can keep a handle, publish
//! tracks and inject failures while a session owns another handle.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use vibes_common::{
    MediaStreamId, ParticipantId, RemoteAudioTrack, SignalingError, TrackName, TrackPublication,
};

/// Subscription primitives of the room client.
pub trait TrackSubscriber {
    /// Audio publications of a participant.
    fn publications(&self, participant: &ParticipantId)
        -> Result<Vec<TrackPublication>, SignalingError>;

    /// Subscribe to a track and resolve its media stream.
    fn subscribe(
        &mut self,
        participant: &ParticipantId,
        track: &TrackName,
    ) -> Result<RemoteAudioTrack, SignalingError>;

    /// Drop a subscription. Unsubscribing a track that is not subscribed is not an error.
    fn unsubscribe(&mut self, participant: &ParticipantId, track: &TrackName)
        -> Result<(), SignalingError>;

    /// The resolved track if currently subscribed.
    fn subscribed_track(
        &self,
        participant: &ParticipantId,
        track: &TrackName,
    ) -> Option<RemoteAudioTrack>;
}

#[derive(Debug, Default)]
struct RoomState {
    connected: bool,
    publications: BTreeMap<ParticipantId, Vec<TrackPublication>>,
    subscriptions: BTreeMap<(ParticipantId, TrackName), MediaStreamId>,
    injected_failures: BTreeMap<(ParticipantId, TrackName), u32>,
    subscribe_calls: BTreeMap<(ParticipantId, TrackName), u32>,
    next_stream: u64,
}

impl RoomState {
    fn publication_mut(
        &mut self,
        participant: &ParticipantId,
        track: &TrackName,
    ) -> Option<&mut TrackPublication> {
        self.publications
            .get_mut(participant)?
            .iter_mut()
            .find(|p| &p.name == track)
    }
}

/// In-process room. Cloning yields another handle to the same room.
#[derive(Debug, Clone)]
pub struct InMemoryRoom {
    state: Arc<Mutex<RoomState>>,
}

impl Default for InMemoryRoom {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRoom {
    /// Create a connected, empty room.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RoomState {
                connected: true,
                ..RoomState::default()
            })),
        }
    }

    /// Add a participant with no publications.
    pub fn join(&self, participant: impl Into<ParticipantId>) {
        self.state
            .lock()
            .publications
            .entry(participant.into())
            .or_default();
    }

    /// Publish a track, adding the participant if needed.
    pub fn publish(&self, participant: impl Into<ParticipantId>, track: impl Into<TrackName>) {
        let participant = participant.into();
        let track = track.into();
        let mut state = self.state.lock();
        let publications = state.publications.entry(participant).or_default();
        if !publications.iter().any(|p| p.name == track) {
            publications.push(TrackPublication::new(track));
        }
    }

    /// Remove a publication and any subscription to it.
    pub fn unpublish(&self, participant: &ParticipantId, track: &TrackName) {
        let mut state = self.state.lock();
        if let Some(publications) = state.publications.get_mut(participant) {
            publications.retain(|p| &p.name != track);
        }
        state
            .subscriptions
            .remove(&(participant.clone(), track.clone()));
    }

    /// Remove a participant, its publications and subscriptions.
    pub fn leave(&self, participant: &ParticipantId) {
        let mut state = self.state.lock();
        state.publications.remove(participant);
        state.subscriptions.retain(|(p, _), _| p != participant);
    }

    /// Make the next `count` subscribe calls for a track fail transiently.
    pub fn fail_subscribes(&self, participant: &ParticipantId, track: &TrackName, count: u32) {
        self.state
            .lock()
            .injected_failures
            .insert((participant.clone(), track.clone()), count);
    }

    /// Simulate losing or regaining the room connection.
    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    /// Subscribe calls made for a track, failed ones included.
    #[must_use]
    pub fn subscribe_calls(&self, participant: &ParticipantId, track: &TrackName) -> u32 {
        self.state
            .lock()
            .subscribe_calls
            .get(&(participant.clone(), track.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Whether a track is subscribed.
    #[must_use]
    pub fn is_subscribed(&self, participant: &ParticipantId, track: &TrackName) -> bool {
        self.state
            .lock()
            .subscriptions
            .contains_key(&(participant.clone(), track.clone()))
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }
}

impl TrackSubscriber for InMemoryRoom {
    fn publications(
        &self,
        participant: &ParticipantId,
    ) -> Result<Vec<TrackPublication>, SignalingError> {
        let state = self.state.lock();
        if !state.connected {
            return Err(SignalingError::NotConnected);
        }
        state
            .publications
            .get(participant)
            .cloned()
            .ok_or_else(|| SignalingError::ParticipantNotFound(participant.clone()))
    }

    fn subscribe(
        &mut self,
        participant: &ParticipantId,
        track: &TrackName,
    ) -> Result<RemoteAudioTrack, SignalingError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(SignalingError::NotConnected);
        }
        let key = (participant.clone(), track.clone());
        *state.subscribe_calls.entry(key.clone()).or_default() += 1;

        if !state.publications.contains_key(participant) {
            return Err(SignalingError::ParticipantNotFound(participant.clone()));
        }
        if state.publication_mut(participant, track).is_none() {
            return Err(SignalingError::TrackNotFound {
                participant: participant.clone(),
                track: track.clone(),
            });
        }
        if let Some(remaining) = state.injected_failures.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SignalingError::Transient("injected subscribe failure".into()));
            }
        }

        let existing = state.subscriptions.get(&key).copied();
        let stream = match existing {
            Some(stream) => stream,
            None => {
                state.next_stream += 1;
                let stream = MediaStreamId::new(state.next_stream);
                state.subscriptions.insert(key, stream);
                stream
            },
        };
        if let Some(publication) = state.publication_mut(participant, track) {
            publication.subscribed = true;
        }
        debug!(participant = %participant, track = %track, "Subscribed");
        Ok(RemoteAudioTrack {
            participant: participant.clone(),
            name: track.clone(),
            stream,
        })
    }

    fn unsubscribe(
        &mut self,
        participant: &ParticipantId,
        track: &TrackName,
    ) -> Result<(), SignalingError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(SignalingError::NotConnected);
        }
        state
            .subscriptions
            .remove(&(participant.clone(), track.clone()));
        if let Some(publication) = state.publication_mut(participant, track) {
            publication.subscribed = false;
        }
        debug!(participant = %participant, track = %track, "Unsubscribed");
        Ok(())
    }

    fn subscribed_track(
        &self,
        participant: &ParticipantId,
        track: &TrackName,
    ) -> Option<RemoteAudioTrack> {
        let state = self.state.lock();
        state
            .subscriptions
            .get(&(participant.clone(), track.clone()))
            .map(|stream| RemoteAudioTrack {
                participant: participant.clone(),
                name: track.clone(),
                stream: *stream,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (ParticipantId, TrackName) {
        (ParticipantId::new("ana"), TrackName::new("voice"))
    }

    #[test]
    fn test_subscribe_resolves_stream() {
        let mut room = InMemoryRoom::new();
        let (ana, voice) = ids();
        room.publish("ana", "voice");

        let track = room.subscribe(&ana, &voice).expect("subscribe");
        assert_eq!(track.participant, ana);
        assert!(room.is_subscribed(&ana, &voice));
        assert!(room.publications(&ana).expect("publications")[0].subscribed);

        // Subscribing again yields the same stream.
        assert_eq!(room.subscribe(&ana, &voice).expect("again").stream, track.stream);
        assert_eq!(room.subscribed_track(&ana, &voice), Some(track));
    }

    #[test]
    fn test_subscribe_errors() {
        let mut room = InMemoryRoom::new();
        let (ana, voice) = ids();
        assert_eq!(
            room.subscribe(&ana, &voice),
            Err(SignalingError::ParticipantNotFound(ana.clone()))
        );

        room.join("ana");
        assert!(matches!(
            room.subscribe(&ana, &voice),
            Err(SignalingError::TrackNotFound { .. })
        ));

        room.set_connected(false);
        assert_eq!(room.subscribe(&ana, &voice), Err(SignalingError::NotConnected));
    }

    #[test]
    fn test_injected_failures_are_transient() {
        let mut room = InMemoryRoom::new();
        let (ana, voice) = ids();
        room.publish("ana", "voice");
        room.fail_subscribes(&ana, &voice, 2);

        assert!(room.subscribe(&ana, &voice).is_err_and(|e| e.is_retryable()));
        assert!(room.subscribe(&ana, &voice).is_err());
        assert!(room.subscribe(&ana, &voice).is_ok());
        assert_eq!(room.subscribe_calls(&ana, &voice), 3);
    }

    #[test]
    fn test_handles_share_state() {
        let mut session_side = InMemoryRoom::new();
        let host_side = session_side.clone();
        let (ana, voice) = ids();

        host_side.publish("ana", "voice");
        session_side.subscribe(&ana, &voice).expect("subscribe");
        assert_eq!(host_side.subscription_count(), 1);

        host_side.leave(&ana);
        assert!(session_side.subscribed_track(&ana, &voice).is_none());
    }

    #[test]
    fn test_unpublish_drops_subscription() {
        let mut room = InMemoryRoom::new();
        let (ana, voice) = ids();
        room.publish("ana", "voice");
        room.subscribe(&ana, &voice).expect("subscribe");

        room.unpublish(&ana, &voice);
        assert!(!room.is_subscribed(&ana, &voice));
        assert!(room.publications(&ana).expect("publications").is_empty());
    }
}
