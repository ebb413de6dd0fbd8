//! Parsing inbound request bodies into domain types.
//!
//! Data sources send coordinates either as JSON numbers or as numeric
//! strings, and ids either as strings or integers. All of that is
//! normalised here; the core only ever sees `f64` points and string ids.
//! Every field is optional at the serde level so a missing field surfaces
//! as [`DomainError::MissingField`] instead of an opaque serde message.

use fencewatch_core::{
    DomainError, DomainResult, GeofenceDraft, GeofenceId, Point, SubjectId, SubjectRegistration,
};
use serde::Deserialize;

/// A number that may arrive as `12.5` or `"12.5"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Number(f64),
    Text(String),
}

impl RawNumber {
    /// Converts to a finite `f64`.
    pub fn to_f64(&self, field: &str) -> DomainResult<f64> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().map_err(|e| DomainError::ParseError {
                field: field.to_string(),
                reason: format!("'{s}' is not a number ({e})"),
            })?,
        };
        if !value.is_finite() {
            return Err(DomainError::invalid(field, value, "a finite number"));
        }
        Ok(value)
    }
}

/// An identifier that may arrive as `"7"` or `7`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Int(i64),
    Text(String),
}

impl RawId {
    /// Renders the id as its canonical string; empty strings are missing.
    pub fn to_id_string(&self, field: &str) -> DomainResult<String> {
        match self {
            Self::Int(n) => Ok(n.to_string()),
            Self::Text(s) if s.trim().is_empty() => Err(DomainError::missing(field)),
            Self::Text(s) => Ok(s.trim().to_string()),
        }
    }
}

/// A boolean signal that may arrive as `true`/`false` or `1`/`0`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawFlag {
    Bool(bool),
    Int(i64),
}

impl RawFlag {
    pub fn to_bool(&self, field: &str) -> DomainResult<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            Self::Int(0) => Ok(false),
            Self::Int(1) => Ok(true),
            Self::Int(other) => Err(DomainError::invalid(field, other, "0 or 1")),
        }
    }
}

fn required<'a, T>(value: &'a Option<T>, field: &str) -> DomainResult<&'a T> {
    value.as_ref().ok_or_else(|| DomainError::missing(field))
}

fn required_point(lat: &Option<RawNumber>, lng: &Option<RawNumber>) -> DomainResult<Point> {
    let latitude = required(lat, "lat")?.to_f64("lat")?;
    let longitude = required(lng, "long")?.to_f64("long")?;
    Ok(Point::new(latitude, longitude))
}

fn optional_text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Location report from a subject's device.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLocationReport {
    #[serde(default)]
    pub tourist_id: Option<RawId>,
    #[serde(default)]
    pub lat: Option<RawNumber>,
    #[serde(default, alias = "lng")]
    pub long: Option<RawNumber>,
}

impl RawLocationReport {
    pub fn to_report(&self) -> DomainResult<(SubjectId, Point)> {
        let id = required(&self.tourist_id, "tourist_id")?.to_id_string("tourist_id")?;
        let point = required_point(&self.lat, &self.long)?;
        Ok((SubjectId::new(id), point))
    }
}

/// Registration of a new subject.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTouristRegistration {
    #[serde(default)]
    pub tourist_id: Option<RawId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub lat: Option<RawNumber>,
    #[serde(default, alias = "lng")]
    pub long: Option<RawNumber>,
    #[serde(default)]
    pub token: Option<String>,
}

impl RawTouristRegistration {
    pub fn to_registration(&self) -> DomainResult<SubjectRegistration> {
        let id = required(&self.tourist_id, "tourist_id")?.to_id_string("tourist_id")?;
        let location = required_point(&self.lat, &self.long)?;
        Ok(SubjectRegistration {
            id: SubjectId::new(id),
            name: optional_text(&self.name),
            token: optional_text(&self.token),
            location,
        })
    }
}

/// SOS raise/clear from a subject's device.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSosSignal {
    #[serde(default)]
    pub tourist_id: Option<RawId>,
    #[serde(default)]
    pub sos_signal: Option<RawFlag>,
}

impl RawSosSignal {
    pub fn to_signal(&self) -> DomainResult<(SubjectId, bool)> {
        let id = required(&self.tourist_id, "tourist_id")?.to_id_string("tourist_id")?;
        let active = required(&self.sos_signal, "sos_signal")?.to_bool("sos_signal")?;
        Ok((SubjectId::new(id), active))
    }
}

/// Geofence create or update body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGeofenceInput {
    #[serde(default)]
    pub id: Option<RawId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub center_lat: Option<RawNumber>,
    #[serde(default)]
    pub center_lng: Option<RawNumber>,
    #[serde(default)]
    pub radius_meters: Option<RawNumber>,
}

impl RawGeofenceInput {
    /// Builds a draft for a new zone. Any `id` in the body is ignored.
    pub fn to_create_draft(&self) -> DomainResult<GeofenceDraft> {
        let name = optional_text(&self.name).ok_or_else(|| DomainError::missing("name"))?;
        let lat = required(&self.center_lat, "center_lat")?.to_f64("center_lat")?;
        let lng = required(&self.center_lng, "center_lng")?.to_f64("center_lng")?;
        let radius = required(&self.radius_meters, "radius_meters")?.to_f64("radius_meters")?;
        Ok(GeofenceDraft::create(name, Point::new(lat, lng), radius))
    }

    /// Builds a draft replacing an existing zone; `id` is required.
    pub fn to_update_draft(&self) -> DomainResult<GeofenceDraft> {
        let id = required(&self.id, "id")?.to_id_string("id")?;
        let mut draft = self.to_create_draft()?;
        draft.id = Some(GeofenceId::new(id));
        Ok(draft)
    }
}

/// Reference to an existing geofence by id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGeofenceRef {
    #[serde(default)]
    pub id: Option<RawId>,
}

impl RawGeofenceRef {
    pub fn to_id(&self) -> DomainResult<GeofenceId> {
        let id = required(&self.id, "id")?.to_id_string("id")?;
        Ok(GeofenceId::new(id))
    }
}
