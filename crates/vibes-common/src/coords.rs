//! Coordinate types for participant positions.
//!
//! Positions are latitude/longitude pairs in the deployed app (`x` = latitude,
//! `y` = longitude), but nothing here assumes that: any planar 2D space works
//! with the linear projection.

use serde::{Deserialize, Serialize};

/// Latitude bounds for geographic positions.
pub const LATITUDE_RANGE: (f64, f64) = (-90.0, 90.0);

/// Longitude bounds for geographic positions.
pub const LONGITUDE_RANGE: (f64, f64) = (-180.0, 180.0);

/// A 2D position snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate (latitude for GPS positions)
    pub x: f64,
    /// Y coordinate (longitude for GPS positions)
    pub y: f64,
}

impl Position {
    /// Creates a new position.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// The origin `(0, 0)`.
    pub const ORIGIN: Self = Self::new(0.0, 0.0);

    /// Latitude view of `x`.
    #[must_use]
    pub const fn lat(self) -> f64 {
        self.x
    }

    /// Longitude view of `y`.
    #[must_use]
    pub const fn lon(self) -> f64 {
        self.y
    }

    /// Returns true if both components are finite numbers.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Returns true if the position is a plausible GPS coordinate.
    #[must_use]
    pub fn is_geographic(self) -> bool {
        self.is_finite()
            && (LATITUDE_RANGE.0..=LATITUDE_RANGE.1).contains(&self.x)
            && (LONGITUDE_RANGE.0..=LONGITUDE_RANGE.1).contains(&self.y)
    }

    /// Linear interpolation towards `other`.
    #[must_use]
    pub fn lerp(self, other: Self, t: f64) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }
}

impl From<(f64, f64)> for Position {
    fn from((x, y): (f64, f64)) -> Self {
        Self::new(x, y)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_finite() {
        assert!(Position::new(1.0, 2.0).is_finite());
        assert!(!Position::new(f64::NAN, 2.0).is_finite());
        assert!(!Position::new(1.0, f64::INFINITY).is_finite());
    }

    #[test]
    fn test_position_geographic() {
        assert!(Position::new(48.85, 2.35).is_geographic());
        assert!(!Position::new(91.0, 0.0).is_geographic());
        assert!(!Position::new(0.0, -181.0).is_geographic());
    }

    #[test]
    fn test_position_lerp() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(10.0, -10.0);
        assert_eq!(a.lerp(b, 0.5), Position::new(5.0, -5.0));
        assert_eq!(a.lerp(b, 2.0), b);
    }

    proptest::proptest! {
        #[test]
        fn prop_lerp_stays_between_endpoints(
            ax in -90.0f64..90.0, ay in -180.0f64..180.0,
            bx in -90.0f64..90.0, by in -180.0f64..180.0,
            t in 0.0f64..1.0,
        ) {
            let p = Position::new(ax, ay).lerp(Position::new(bx, by), t);
            proptest::prop_assert!(p.x >= ax.min(bx) - 1e-9 && p.x <= ax.max(bx) + 1e-9);
            proptest::prop_assert!(p.y >= ay.min(by) - 1e-9 && p.y <= ay.max(by) + 1e-9);
            proptest::prop_assert!(p.is_geographic());
        }
    }
}
