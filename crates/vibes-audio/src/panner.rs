//! Panner parameters and distance models.
//!
//! These mirror the parameters a 3D panner node accepts. [`DistanceModel::gain`]
//! evaluates the same formulas the platform applies, which lets the headless
//! backend (and diagnostics) report the effective attenuation of a source.

use serde::{Deserialize, Serialize};

/// Default reference distance in meters (full volume inside this radius).
pub const DEFAULT_REF_DISTANCE: f32 = 1.0;

/// Default maximum distance in meters.
pub const DEFAULT_MAX_DISTANCE: f32 = 50.0;

/// Default rolloff factor.
pub const DEFAULT_ROLLOFF_FACTOR: f32 = 2.0;

/// Panning algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanningModel {
    /// Simple equal-power stereo panning.
    EqualPower,
    /// Head-related transfer function panning.
    #[default]
    Hrtf,
}

/// Distance attenuation model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceModel {
    /// Linear falloff from reference to max distance.
    Linear,
    /// Inverse distance falloff.
    Inverse,
    /// Exponential falloff.
    #[default]
    Exponential,
}

impl DistanceModel {
    /// Calculate the gain (0.0-1.0) for a source at `distance`.
    ///
    /// # Arguments
    /// * `distance` - Distance from listener to source
    /// * `ref_distance` - Reference distance (full volume)
    /// * `max_distance` - Maximum distance (only clamps the linear model)
    /// * `rolloff` - Rolloff factor
    #[must_use]
    pub fn gain(self, distance: f32, ref_distance: f32, max_distance: f32, rolloff: f32) -> f32 {
        let d = distance.max(0.0);
        let ref_distance = ref_distance.max(f32::EPSILON);

        match self {
            Self::Linear => {
                let range = max_distance - ref_distance;
                if range <= 0.0 {
                    return 1.0;
                }
                let clamped = d.clamp(ref_distance, max_distance);
                (1.0 - rolloff.clamp(0.0, 1.0) * (clamped - ref_distance) / range).clamp(0.0, 1.0)
            },
            Self::Inverse => {
                let d = d.max(ref_distance);
                ref_distance / (ref_distance + rolloff.max(0.0) * (d - ref_distance))
            },
            Self::Exponential => {
                let d = d.max(ref_distance);
                (d / ref_distance).powf(-rolloff.max(0.0))
            },
        }
    }

    /// Get a human-readable name for this model.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Linear => "Linear",
            Self::Inverse => "Inverse",
            Self::Exponential => "Exponential",
        }
    }
}

/// Panner node configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PannerParams {
    /// Panning algorithm.
    pub panning_model: PanningModel,
    /// Distance attenuation model.
    pub distance_model: DistanceModel,
    /// Reference distance in meters.
    pub ref_distance: f32,
    /// Maximum distance in meters.
    pub max_distance: f32,
    /// Rolloff factor.
    pub rolloff_factor: f32,
}

impl Default for PannerParams {
    fn default() -> Self {
        Self {
            panning_model: PanningModel::Hrtf,
            distance_model: DistanceModel::Exponential,
            ref_distance: DEFAULT_REF_DISTANCE,
            max_distance: DEFAULT_MAX_DISTANCE,
            rolloff_factor: DEFAULT_ROLLOFF_FACTOR,
        }
    }
}

impl PannerParams {
    /// Gain the panner applies at `distance`.
    #[must_use]
    pub fn gain_at(&self, distance: f32) -> f32 {
        self.distance_model.gain(
            distance,
            self.ref_distance,
            self.max_distance,
            self.rolloff_factor,
        )
    }
}
