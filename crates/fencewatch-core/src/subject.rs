//! Tracked field agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geo::Point;
use crate::status::ZoneStatus;

/// Opaque subject identifier (`tourist_id` on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    /// Creates a new SubjectId from a string.
    ///
    /// Note: no format is enforced. Data sources pick their own ids.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A tracked subject as stored by the datastore.
///
/// The daemon only rewrites `location`, `status`, the SOS fields and
/// `last_updated`; everything else belongs to whoever registered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub name: Option<String>,

    /// Device token supplied at registration, kept opaque
    pub token: Option<String>,

    pub location: Point,
    pub status: ZoneStatus,
    pub sos_active: bool,
    pub sos_timestamp: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

impl Subject {
    /// Creates a subject at `location` with no name, no SOS and status
    /// `Outside`.
    pub fn new(id: SubjectId, location: Point) -> Self {
        Self {
            id,
            name: None,
            token: None,
            location,
            status: ZoneStatus::Outside,
            sos_active: false,
            sos_timestamp: None,
            last_updated: Utc::now(),
        }
    }

    /// Applies a new position and its evaluated status.
    pub fn relocate(&mut self, location: Point, status: ZoneStatus) {
        self.location = location;
        self.status = status;
        self.last_updated = Utc::now();
    }

    /// Applies a re-evaluated status for the position already held.
    pub fn set_status(&mut self, status: ZoneStatus) {
        self.status = status;
        self.last_updated = Utc::now();
    }

    /// Raises or clears the SOS signal, stamping the time of the change.
    pub fn set_sos(&mut self, active: bool) {
        let now = Utc::now();
        self.sos_active = active;
        self.sos_timestamp = Some(now);
        self.last_updated = now;
    }
}

/// Input for registering a subject ahead of its first location report.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectRegistration {
    pub id: SubjectId,
    pub name: Option<String>,
    pub token: Option<String>,
    pub location: Point,
}

impl SubjectRegistration {
    /// Builds the stored subject. Status starts `Outside` until the first
    /// evaluated report.
    pub fn into_subject(self) -> Subject {
        let mut subject = Subject::new(self.id, self.location);
        subject.name = self.name;
        subject.token = self.token;
        subject
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_subject_defaults() {
        let subject = Subject::new(SubjectId::new("t-1"), Point::new(1.0, 2.0));
        assert_eq!(subject.status, ZoneStatus::Outside);
        assert!(!subject.sos_active);
        assert!(subject.sos_timestamp.is_none());
        assert!(subject.name.is_none());
    }

    #[test]
    fn test_relocate_keeps_other_fields() {
        let mut subject = SubjectRegistration {
            id: SubjectId::new("t-1"),
            name: Some("Ana".to_string()),
            token: Some("tok".to_string()),
            location: Point::new(1.0, 2.0),
        }
        .into_subject();
        subject.set_sos(true);

        subject.relocate(Point::new(3.0, 4.0), ZoneStatus::Inside);

        assert_eq!(subject.location, Point::new(3.0, 4.0));
        assert_eq!(subject.status, ZoneStatus::Inside);
        assert_eq!(subject.name.as_deref(), Some("Ana"));
        assert_eq!(subject.token.as_deref(), Some("tok"));
        assert!(subject.sos_active);
    }

    #[test]
    fn test_set_status_leaves_location() {
        let mut subject = Subject::new(SubjectId::new("t-1"), Point::new(1.0, 2.0));
        let before = subject.last_updated;
        subject.set_status(ZoneStatus::Inside);
        assert_eq!(subject.status, ZoneStatus::Inside);
        assert_eq!(subject.location, Point::new(1.0, 2.0));
        assert!(subject.last_updated >= before);
    }

    #[test]
    fn test_set_sos_stamps_time() {
        let mut subject = Subject::new(SubjectId::new("t-1"), Point::default());
        let before = Utc::now();
        subject.set_sos(true);
        assert!(subject.sos_active);
        assert!(subject.sos_timestamp.unwrap() >= before);

        subject.set_sos(false);
        assert!(!subject.sos_active);
        assert!(subject.sos_timestamp.is_some());
    }

    #[test]
    fn test_subject_id_display() {
        assert_eq!(SubjectId::new("abc").to_string(), "abc");
    }
}
