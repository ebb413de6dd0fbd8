//! Great-circle distance on a spherical earth.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DomainError, DomainResult};

/// Mean earth radius used by the haversine approximation, in metres.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A WGS-84 position in decimal degrees.
///
/// No range validation is performed; a latitude of 123.0 is accepted and
/// simply produces a meaningless distance.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub latitude: f64,
    pub longitude: f64,
}

impl Point {
    /// Creates a point from latitude and longitude in degrees.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Rejects NaN and infinite coordinates.
    ///
    /// Used by the datastore before accepting a write; the distance math
    /// itself never fails.
    pub fn ensure_finite(&self) -> DomainResult<()> {
        if !self.latitude.is_finite() {
            return Err(DomainError::invalid("latitude", self.latitude, "a finite number"));
        }
        if !self.longitude.is_finite() {
            return Err(DomainError::invalid("longitude", self.longitude, "a finite number"));
        }
        Ok(())
    }

    /// Distance to another point in metres.
    pub fn distance_to(&self, other: &Point) -> f64 {
        distance(*self, *other)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Haversine distance between two points, in metres.
///
/// Always `>= 0` and symmetric in its arguments.
pub fn distance(a: Point, b: Point) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    // Rounding can push h marginally outside [0, 1] for antipodal points
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}
