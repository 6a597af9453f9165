//! Notice bus from the session core to the host UI.

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::debug;

use vibes_common::{ModerationKind, ParticipantId, TrackName};

/// Things the host UI may want to display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionNotice {
    /// Voice subscription given up after exhausting retries
    VoiceUnavailable {
        /// Publisher
        participant: ParticipantId,
        /// Voice track
        track: TrackName,
        /// Attempts made
        attempts: u32,
    },
    /// Party music is playing
    PartyJoined {
        /// Party host
        participant: ParticipantId,
    },
    /// Party join gave up
    PartyJoinFailed {
        /// Party host
        participant: ParticipantId,
        /// Last failure
        reason: String,
    },
    /// A moderator ended the joined party
    ForcedLeave {
        /// Party host
        participant: ParticipantId,
        /// Moderator action
        kind: ModerationKind,
    },
    /// A moderator acted on a remote voice track
    VoiceModerated {
        /// Publisher
        participant: ParticipantId,
        /// Affected track, `None` for all tracks
        track: Option<TrackName>,
        /// Moderator action
        kind: ModerationKind,
    },
    /// A moderator acted on one of our own tracks
    LocalTrackModerated {
        /// Affected track, `None` for all tracks
        track: Option<TrackName>,
        /// Moderator action
        kind: ModerationKind,
    },
}

/// Bounded notice queue drained by the host.
#[derive(Debug)]
pub struct NoticeBus {
    sender: Sender<SessionNotice>,
    receiver: Receiver<SessionNotice>,
    capacity: usize,
}

impl Default for NoticeBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl NoticeBus {
    /// Creates a bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Publishes a notice. Dropped if the host has not drained a full queue.
    pub fn publish(&self, notice: SessionNotice) {
        if let Err(e) = self.sender.try_send(notice) {
            debug!("Notice dropped: {:?}", e.into_inner());
        }
    }

    /// Drains all pending notices.
    pub fn drain(&self) -> Vec<SessionNotice> {
        self.receiver.try_iter().collect()
    }

    /// Returns the number of pending notices.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Returns the channel capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
