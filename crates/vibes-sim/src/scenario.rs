//! Scripted headless room.
//!
//! A walker with a microphone crosses the listener's voice radius while a
//! music host stands out of earshot. Along the walk the listener joins the
//! party, leaves it, rejoins, and finally a moderator unpublishes the music.
//!
//! ```text
//! step:   0 ─────── n/4 ─────── n/2 ─────── 3n/4 ─────── n
//! walker: far west ──────── listener ──────── far east
//! party:            join        leave       rejoin      moderated
//! ```

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use vibes_audio::{GestureKind, HeadlessBackend, TrackedResources};
use vibes_common::{
    ModerationKind, ModerationNotice, ParticipantId, ParticipantMetadata, TrackName, DEFAULT_MUSIC_TRACK,
};
use vibes_session::{InMemoryRoom, Roster, SessionNotice, SpatialSession};

use crate::config::SimConfig;

const LOCAL: &str = "listener";
const WALKER: &str = "walker";
const HOST: &str = "dj";
const VOICE_TRACK: &str = "mic";

/// What the run observed.
#[derive(Debug, Clone, Default)]
pub struct SimReport {
    /// Steps taken
    pub steps: u32,
    /// Steps during which the walker was audible
    pub audible_steps: u32,
    /// Loudest walker volume seen
    pub peak_volume: f32,
    /// Every notice drained from the session
    pub notices: Vec<SessionNotice>,
    /// Elements still alive after disconnect
    pub leaked_elements: usize,
    /// Graph nodes still alive after disconnect
    pub leaked_nodes: usize,
    /// Tracked resources still registered after disconnect
    pub leaked_resources: usize,
    /// Room subscriptions still held after disconnect
    pub leaked_subscriptions: usize,
}

impl SimReport {
    /// Whether disconnect released everything.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.leaked_elements == 0
            && self.leaked_nodes == 0
            && self.leaked_resources == 0
            && self.leaked_subscriptions == 0
    }
}

/// Run the scripted scenario.
pub fn run(config: &SimConfig) -> Result<SimReport> {
    let scenario = config.scenario;
    let walker = ParticipantId::new(WALKER);
    let host = ParticipantId::new(HOST);

    let room = InMemoryRoom::new();
    room.join(LOCAL);
    room.publish(WALKER, VOICE_TRACK);
    room.publish(HOST, DEFAULT_MUSIC_TRACK);
    if scenario.voice_failures > 0 {
        room.fail_subscribes(&walker, &TrackName::new(VOICE_TRACK), scenario.voice_failures);
    }
    if scenario.party_failures > 0 {
        room.fail_subscribes(&host, &TrackName::new(DEFAULT_MUSIC_TRACK), scenario.party_failures);
    }

    let mut roster = Roster::new();
    roster.upsert(
        host.clone(),
        ParticipantMetadata::new(HOST, scenario.host_position).with_party("Rooftop"),
    );

    let mut session = SpatialSession::new(LOCAL, HeadlessBackend::new(), room.clone(), config.session);
    if !session.connect() {
        warn!("No audio output; continuing with subscriptions only");
    }
    if session.wants_gesture_listeners() {
        session.handle_user_gesture(GestureKind::Click);
    }

    // A host-side upload, released with the session.
    let url = session.backend_mut().create_object_url();
    session.register_resource("upload", TrackedResources::default().with_object_url(url));

    let mut report = SimReport::default();
    let steps = scenario.walk_steps;
    let tick = scenario.tick();

    for step in 0..=steps {
        let position = scenario
            .walker_start
            .lerp(scenario.walker_end, f64::from(step) / f64::from(steps));
        roster.upsert(walker.clone(), ParticipantMetadata::new(WALKER, position));
        session.sync_roster(&roster);
        session.update(tick);

        if step == steps / 4 || step == steps * 3 / 4 {
            let outcome = session
                .join_party(&host)
                .context("joining the music party")?;
            info!(step, "Party join: {:?}", outcome);
        } else if step == steps / 2 {
            session.leave_party(&host);
            info!(step, "Left party");
        }

        let volume = session.graph().source_volume(&walker);
        if let Some(volume) = volume {
            report.audible_steps += 1;
            report.peak_volume = report.peak_volume.max(volume);
        }
        debug!(
            step,
            lat = position.lat(),
            lon = position.lon(),
            sources = session.graph().source_count(),
            volume = volume.unwrap_or(0.0),
            party = ?session.current_party(),
            "Tick"
        );
        collect_notices(&session, &mut report);
        report.steps = step + 1;
    }

    // Let any party retry settle before the moderator acts.
    let settle = config.session.retry.total_delay();
    let mut waited = std::time::Duration::ZERO;
    while waited < settle && session.current_party().is_none() {
        session.update(tick);
        waited += tick;
    }

    session.on_moderation_notice(&ModerationNotice::new(
        ModerationKind::TrackUnpublished,
        host,
        Some(TrackName::new(DEFAULT_MUSIC_TRACK)),
    ));
    collect_notices(&session, &mut report);

    info!(
        audible_steps = report.audible_steps,
        peak_volume = report.peak_volume,
        notices = report.notices.len(),
        "Walk finished"
    );

    session.disconnect();
    let backend = session.graph().backend();
    report.leaked_elements = backend.element_count();
    report.leaked_nodes = backend.node_count();
    report.leaked_resources = session.graph().resources().len();
    report.leaked_subscriptions = room.subscription_count();

    Ok(report)
}

fn collect_notices(session: &SpatialSession<HeadlessBackend, InMemoryRoom>, report: &mut SimReport) {
    for notice in session.drain_notices() {
        info!("Notice: {:?}", notice);
        report.notices.push(notice);
    }
}
