//! Aggregating per-zone containment into one subject status.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geo::Point;
use crate::geofence::{Geofence, GeofenceId};

/// Whether a point lies inside a zone (or any zone, for the aggregate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneStatus {
    Inside,
    #[default]
    Outside,
}

impl ZoneStatus {
    /// Maps a containment test to a status.
    pub fn from_contained(contained: bool) -> Self {
        if contained {
            Self::Inside
        } else {
            Self::Outside
        }
    }

    pub fn is_inside(&self) -> bool {
        matches!(self, Self::Inside)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inside => "inside",
            Self::Outside => "outside",
        }
    }
}

impl fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of testing one point against one zone. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceResult {
    pub geofence_id: GeofenceId,
    pub name: String,
    pub status: ZoneStatus,
    pub distance_meters: f64,
}

/// Per-zone results for a point plus the aggregate status.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Evaluation {
    /// One entry per input geofence, in input order
    pub results: Vec<GeofenceResult>,

    /// `Inside` iff any entry of `results` is inside
    pub aggregate: ZoneStatus,
}

impl Evaluation {
    /// Ids of the zones that contain the point.
    pub fn inside_ids(&self) -> impl Iterator<Item = &GeofenceId> {
        self.results
            .iter()
            .filter(|r| r.status.is_inside())
            .map(|r| &r.geofence_id)
    }
}

/// Evaluates `point` against every geofence in one pass.
///
/// An empty set yields no results and `Outside`.
pub fn evaluate(point: Point, geofences: &[Geofence]) -> Evaluation {
    let results: Vec<GeofenceResult> = geofences
        .iter()
        .map(|g| {
            let distance_meters = g.distance_to(point);
            GeofenceResult {
                geofence_id: g.id.clone(),
                name: g.name.clone(),
                status: ZoneStatus::from_contained(distance_meters <= g.radius_meters),
                distance_meters,
            }
        })
        .collect();

    let aggregate = ZoneStatus::from_contained(results.iter().any(|r| r.status.is_inside()));

    tracing::trace!(
        point = %point,
        geofences = results.len(),
        aggregate = %aggregate,
        "Evaluated point"
    );

    Evaluation { results, aggregate }
}

/// Evaluates `point` against a geofence set that has to be loaded first.
///
/// A load failure is returned untouched so callers can tell "there are no
/// geofences" (`Ok` with an empty set) from "the geofences could not be
/// read" (`Err`).
pub fn evaluate_with<E, F>(point: Point, load: F) -> Result<Evaluation, E>
where
    F: FnOnce() -> Result<Vec<Geofence>, E>,
{
    let geofences = load()?;
    Ok(evaluate(point, &geofences))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fence(id: &str, lat: f64, lng: f64, radius_meters: f64) -> Geofence {
        Geofence {
            id: GeofenceId::new(id),
            name: format!("zone-{id}"),
            center: Point::new(lat, lng),
            radius_meters,
        }
    }

    #[test]
    fn test_empty_set_is_outside() {
        let eval = evaluate(Point::new(10.0, 20.0), &[]);
        assert!(eval.results.is_empty());
        assert_eq!(eval.aggregate, ZoneStatus::Outside);
    }

    #[test]
    fn test_inside_at_center() {
        let eval = evaluate(Point::new(10.0, 20.0), &[fence("1", 10.0, 20.0, 1000.0)]);
        assert_eq!(eval.aggregate, ZoneStatus::Inside);
        let first = eval.results.first().unwrap();
        assert_eq!(first.status, ZoneStatus::Inside);
        assert!(first.distance_meters < 1e-6);
    }

    #[test]
    fn test_outside_eleven_hundred_meters_away() {
        let eval = evaluate(Point::new(10.01, 20.0), &[fence("1", 10.0, 20.0, 1000.0)]);
        assert_eq!(eval.aggregate, ZoneStatus::Outside);
        let first = eval.results.first().unwrap();
        assert!((first.distance_meters - 1111.95).abs() < 0.1);
    }

    #[test]
    fn test_any_inside_makes_aggregate_inside() {
        let fences = [
            fence("far", 50.0, 50.0, 10.0),
            fence("near", 10.0, 20.0, 2000.0),
            fence("other", -10.0, 20.0, 10.0),
        ];
        let eval = evaluate(Point::new(10.01, 20.0), &fences);

        assert_eq!(eval.aggregate, ZoneStatus::Inside);
        let statuses: Vec<ZoneStatus> = eval.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![ZoneStatus::Outside, ZoneStatus::Inside, ZoneStatus::Outside]
        );
        let inside: Vec<&str> = eval.inside_ids().map(|id| id.as_str()).collect();
        assert_eq!(inside, vec!["near"]);
    }

    #[test]
    fn test_results_keep_input_order() {
        let fences = [
            fence("c", 0.0, 0.0, 1.0),
            fence("a", 1.0, 1.0, 1.0),
            fence("b", 2.0, 2.0, 1.0),
        ];
        let eval = evaluate(Point::new(0.0, 0.0), &fences);
        let ids: Vec<&str> = eval.results.iter().map(|r| r.geofence_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_evaluate_with_propagates_load_failure() {
        let result: Result<Evaluation, &str> =
            evaluate_with(Point::new(10.0, 20.0), || Err("datastore offline"));
        assert_eq!(result, Err("datastore offline"));

        let empty: Result<Evaluation, &str> = evaluate_with(Point::new(10.0, 20.0), || Ok(vec![]));
        assert_eq!(empty.unwrap().aggregate, ZoneStatus::Outside);
    }

    #[test]
    fn test_zone_status_serde() {
        assert_eq!(serde_json::to_string(&ZoneStatus::Inside).unwrap(), "\"inside\"");
        let parsed: ZoneStatus = serde_json::from_str("\"outside\"").unwrap();
        assert_eq!(parsed, ZoneStatus::Outside);
        assert_eq!(ZoneStatus::default(), ZoneStatus::Outside);
    }
}
