//! fencewatch core - Shared domain types and geofence math
//!
//! This crate provides the types shared between the daemon (fencewatchd)
//! and the wire protocol, plus the pure geometry that decides whether a
//! subject is inside any zone.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod geo;
pub mod geofence;
pub mod status;
pub mod subject;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use geo::{distance, Point, EARTH_RADIUS_METERS};
pub use geofence::{contains, Geofence, GeofenceDraft, GeofenceId};
pub use status::{evaluate, evaluate_with, Evaluation, GeofenceResult, ZoneStatus};
pub use subject::{Subject, SubjectId, SubjectRegistration};
