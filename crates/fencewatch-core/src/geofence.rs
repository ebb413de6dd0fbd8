//! Circular zones and the containment test.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DomainError, DomainResult};
use crate::geo::{distance, Point};

/// Opaque geofence identifier.
///
/// Transmitted as a string on the wire regardless of how the datastore
/// generates it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeofenceId(String);

impl GeofenceId {
    /// Creates a new GeofenceId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GeofenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GeofenceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A stored circular zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub id: GeofenceId,
    pub name: String,
    pub center: Point,
    pub radius_meters: f64,
}

impl Geofence {
    /// Distance from `point` to this zone's centre, in metres.
    pub fn distance_to(&self, point: Point) -> f64 {
        distance(point, self.center)
    }

    /// Returns true if `point` lies inside or exactly on the boundary.
    pub fn contains(&self, point: Point) -> bool {
        contains(point, self)
    }
}

/// Boundary-inclusive containment: `distance(point, center) <= radius`.
pub fn contains(point: Point, geofence: &Geofence) -> bool {
    geofence.distance_to(point) <= geofence.radius_meters
}

/// Input to a geofence create or update.
///
/// `id = None` asks the datastore to create a new zone; `Some` updates the
/// zone with that id.
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceDraft {
    pub id: Option<GeofenceId>,
    pub name: String,
    pub center: Point,
    pub radius_meters: f64,
}

impl GeofenceDraft {
    /// Creates a draft for a new zone.
    pub fn create(name: impl Into<String>, center: Point, radius_meters: f64) -> Self {
        Self {
            id: None,
            name: name.into(),
            center,
            radius_meters,
        }
    }

    /// Creates a draft replacing the zone with `id`.
    pub fn update(
        id: GeofenceId,
        name: impl Into<String>,
        center: Point,
        radius_meters: f64,
    ) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
            center,
            radius_meters,
        }
    }

    /// Checks the fields a datastore requires before accepting the write.
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::missing("name"));
        }
        self.center.ensure_finite()?;
        if !self.radius_meters.is_finite() || self.radius_meters < 0.0 {
            return Err(DomainError::invalid(
                "radius_meters",
                self.radius_meters,
                "a finite value >= 0",
            ));
        }
        Ok(())
    }

    /// Materialises the draft under the given id.
    pub fn into_geofence(self, id: GeofenceId) -> Geofence {
        Geofence {
            id,
            name: self.name,
            center: self.center,
            radius_meters: self.radius_meters,
        }
    }
}
