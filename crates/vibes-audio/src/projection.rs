//! Geographic projection into listener-relative acoustic space.
//!
//! Converts two participant positions into a meter offset of the source
//! relative to the listener. The offset feeds the panner's `x`/`z` axes, so
//! both algorithms share one axis convention:
//!
//! - `x` grows as the source moves south of the listener (`listener.x - source.x`)
//! - `z` grows as the source moves east of the listener (`source.y - listener.y`)
//!
//! The linear form is metrically correct only for planar coordinates. Real GPS
//! coordinates should use the great-circle form.
//!
//! # Example
//!
//! ```
//! use vibes_audio::projection::ProjectionMode;
//! use vibes_common::Position;
//!
//! let mode = ProjectionMode::GreatCircle;
//! let listener = Position::new(0.0, 0.0);
//! let source = Position::new(0.0, 0.0003);
//!
//! let offset = mode.project(listener, source);
//! assert!((offset.east() - 33.36).abs() < 0.1);
//! assert!(mode.distance(listener, source) < 50.0);
//! ```

use glam::Vec3;
use serde::{Deserialize, Serialize};
use vibes_common::Position;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Approximate meters per degree at the equator, for linear projections of GPS data.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Source offset relative to the listener, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RelativeOffset {
    /// South-positive axis.
    pub x: f64,
    /// East-positive axis.
    pub z: f64,
}

impl RelativeOffset {
    /// No offset.
    pub const ZERO: Self = Self { x: 0.0, z: 0.0 };

    /// Creates an offset.
    #[must_use]
    pub const fn new(x: f64, z: f64) -> Self {
        Self { x, z }
    }

    /// Euclidean length in meters.
    #[must_use]
    pub fn length(self) -> f64 {
        self.x.hypot(self.z)
    }

    /// Meters east of the listener.
    #[must_use]
    pub const fn east(self) -> f64 {
        self.z
    }

    /// Meters north of the listener.
    #[must_use]
    pub fn north(self) -> f64 {
        -self.x
    }

    /// Panner coordinates; the listener stays at the origin on the ground plane.
    #[must_use]
    pub fn to_panner(self) -> Vec3 {
        Vec3::new(self.x as f32, 0.0, self.z as f32)
    }
}

impl std::ops::Neg for RelativeOffset {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.z)
    }
}

/// Projection algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ProjectionMode {
    /// Multiply coordinate deltas by a meters-per-unit factor.
    Linear {
        /// Meters per coordinate unit.
        scale: f64,
    },
    /// Haversine projection; `x` is latitude and `y` is longitude.
    #[default]
    GreatCircle,
}

impl ProjectionMode {
    /// Linear projection with one meter per unit.
    pub const PLANAR: Self = Self::Linear { scale: 1.0 };

    /// Linear projection with an explicit scale.
    #[must_use]
    pub const fn linear(scale: f64) -> Self {
        Self::Linear { scale }
    }

    /// Projects `source` into the listener's frame.
    #[must_use]
    pub fn project(&self, listener: Position, source: Position) -> RelativeOffset {
        match *self {
            Self::Linear { scale } => project_linear(listener, source, scale),
            Self::GreatCircle => project_great_circle(listener, source),
        }
    }

    /// Distance in meters between two positions under this projection.
    #[must_use]
    pub fn distance(&self, a: Position, b: Position) -> f64 {
        self.project(a, b).length()
    }

    /// Returns a short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Linear { .. } => "linear",
            Self::GreatCircle => "great-circle",
        }
    }
}

/// Linear-scale projection.
#[must_use]
pub fn project_linear(listener: Position, source: Position, scale: f64) -> RelativeOffset {
    RelativeOffset {
        x: (listener.x - source.x) * scale,
        z: (source.y - listener.y) * scale,
    }
}

/// Great-circle projection.
///
/// The east-west component is the haversine distance along the listener's
/// parallel to the source longitude; the north-south component is measured
/// along the listener's meridian to the source latitude.
#[must_use]
pub fn project_great_circle(listener: Position, source: Position) -> RelativeOffset {
    let east_west = haversine_distance(listener, Position::new(listener.lat(), source.lon()));
    let north_south = haversine_distance(listener, Position::new(source.lat(), listener.lon()));

    let east_sign = wrap_degrees(source.lon() - listener.lon()).signum();
    let north_sign = (source.lat() - listener.lat()).signum();

    RelativeOffset {
        x: -north_south * north_sign,
        z: east_west * east_sign,
    }
}

/// Haversine distance in meters between two lat/lon positions.
#[must_use]
pub fn haversine_distance(a: Position, b: Position) -> f64 {
    let lat1 = a.lat().to_radians();
    let lat2 = b.lat().to_radians();
    let dlat = (b.lat() - a.lat()).to_radians();
    let dlon = wrap_degrees(b.lon() - a.lon()).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

/// Wraps a longitude delta into `[-180, 180]`.
fn wrap_degrees(delta: f64) -> f64 {
    let wrapped = (delta + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && delta > 0.0 {
        180.0
    } else {
        wrapped
    }
}
