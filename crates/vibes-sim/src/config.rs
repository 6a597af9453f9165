//! Simulator configuration.
//!
//! Holds the session tunables and the scripted scenario. Configuration can be
//! loaded from and saved to a TOML file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use vibes_common::Position;
use vibes_session::SessionConfig;

/// Configuration file name.
pub const CONFIG_FILE: &str = "vibes.toml";

/// Scripted room scenario.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Simulated frame length in milliseconds
    pub tick_ms: u64,
    /// Number of steps the walker takes from start to end
    pub walk_steps: u32,
    /// Where the walking voice publisher starts
    pub walker_start: Position,
    /// Where the walking voice publisher stops
    pub walker_end: Position,
    /// Where the music party host stands
    pub host_position: Position,
    /// Transient failures injected into the walker's voice subscription
    pub voice_failures: u32,
    /// Transient failures injected into the party music subscription
    pub party_failures: u32,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            tick_ms: 250,
            walk_steps: 40,
            // ~89 m west to ~89 m east of the listener at the origin.
            walker_start: Position::new(0.0, -0.0008),
            walker_end: Position::new(0.0, 0.0008),
            host_position: Position::new(0.001, 0.001),
            voice_failures: 1,
            party_failures: 1,
        }
    }
}

impl ScenarioConfig {
    /// Frame length.
    #[must_use]
    pub const fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Simulator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    // === Session Settings ===
    /// Audio graph, proximity and retry settings
    pub session: SessionConfig,

    // === Scenario Settings ===
    /// Scripted walk and failure injection
    pub scenario: ScenarioConfig,
}

impl SimConfig {
    /// Load configuration from `path`.
    /// Falls back to defaults if the file is missing or invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No config at {}, using defaults", path.display());
                return Self::default();
            },
            Err(e) => {
                warn!("Failed to read config file: {e}");
                return Self::default();
            },
        };

        toml::from_str(&contents).unwrap_or_else(|e| {
            warn!("Failed to parse config file: {e}");
            Self::default()
        })
    }

    /// Write configuration to `path`, creating parent directories.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        // Session
        let spatial = &mut self.session.spatial;
        spatial.sample_rate = spatial.sample_rate.clamp(8_000, 192_000);
        spatial.panner.ref_distance = spatial.panner.ref_distance.max(0.01);
        spatial.panner.max_distance = spatial.panner.max_distance.max(spatial.panner.ref_distance);
        spatial.panner.rolloff_factor = spatial.panner.rolloff_factor.max(0.0);
        self.session.proximity.radius_m = self.session.proximity.radius_m.clamp(1.0, 10_000.0);
        self.session.retry.max_retries = self.session.retry.max_retries.min(10);
        self.session.retry.multiplier = self.session.retry.multiplier.max(1);
        self.session.notice_capacity = self.session.notice_capacity.clamp(16, 65_536);

        // Scenario
        self.scenario.tick_ms = self.scenario.tick_ms.clamp(10, 10_000);
        self.scenario.walk_steps = self.scenario.walk_steps.clamp(1, 10_000);
        if !self.scenario.walker_start.is_finite() {
            self.scenario.walker_start = ScenarioConfig::default().walker_start;
        }
        if !self.scenario.walker_end.is_finite() {
            self.scenario.walker_end = ScenarioConfig::default().walker_end;
        }
        if !self.scenario.host_position.is_finite() {
            self.scenario.host_position = ScenarioConfig::default().host_position;
        }
    }
}
