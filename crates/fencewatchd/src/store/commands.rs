//! Store actor commands and errors.
//!
//! This module defines the message types for communicating with the `StoreActor`:
//! - `StoreCommand`: Commands sent to the actor
//! - `StoreError`: Errors a datastore can report
//!
//! All types are designed for async message passing and follow the panic-free policy.

use fencewatch_core::{
    Geofence, GeofenceDraft, GeofenceId, Point, Subject, SubjectId, SubjectRegistration,
    ZoneStatus,
};
use thiserror::Error;
use tokio::sync::oneshot;

// ============================================================================
// Store Commands
// ============================================================================

/// Commands sent to the store actor.
///
/// Each command carries a oneshot channel for the response, so callers
/// await the result without sharing any state with the actor.
#[derive(Debug)]
pub enum StoreCommand {
    /// List every geofence in creation order.
    ListGeofences {
        respond_to: oneshot::Sender<Vec<Geofence>>,
    },

    /// Create (`draft.id == None`) or replace a geofence.
    ///
    /// # Errors
    /// - `StoreError::Rejected` if the draft fails validation
    /// - `StoreError::NotFound` if updating an unknown id
    /// - `StoreError::Full` if creating beyond capacity
    UpsertGeofence {
        draft: GeofenceDraft,
        respond_to: oneshot::Sender<Result<Geofence, StoreError>>,
    },

    /// Delete a geofence.
    ///
    /// # Errors
    /// - `StoreError::NotFound` if the id is unknown
    DeleteGeofence {
        geofence_id: GeofenceId,
        respond_to: oneshot::Sender<Result<(), StoreError>>,
    },

    /// List every subject in registration order.
    ListSubjects {
        respond_to: oneshot::Sender<Vec<Subject>>,
    },

    /// Register a subject ahead of its first report.
    ///
    /// The registration is boxed to reduce enum size variance.
    ///
    /// # Errors
    /// - `StoreError::AlreadyExists` if the id is taken
    /// - `StoreError::Rejected` if the location is not finite
    /// - `StoreError::Full` if at capacity
    CreateSubject {
        registration: Box<SubjectRegistration>,
        respond_to: oneshot::Sender<Result<Subject, StoreError>>,
    },

    /// Write a subject's location and status, creating it on first report.
    ///
    /// # Errors
    /// - `StoreError::Rejected` if the location is not finite
    /// - `StoreError::Full` if creating beyond capacity
    UpsertSubjectLocation {
        subject_id: SubjectId,
        location: Point,
        status: ZoneStatus,
        respond_to: oneshot::Sender<Result<Subject, StoreError>>,
    },

    /// Write a re-evaluated status, but only while the subject is still at
    /// `expected_location`. Answers `None` without writing if it has moved.
    ///
    /// # Errors
    /// - `StoreError::NotFound` if the subject is unknown
    UpdateSubjectStatusIfAt {
        subject_id: SubjectId,
        expected_location: Point,
        status: ZoneStatus,
        respond_to: oneshot::Sender<Result<Option<Subject>, StoreError>>,
    },

    /// Raise or clear a subject's SOS signal.
    ///
    /// # Errors
    /// - `StoreError::NotFound` if the subject is unknown
    UpsertSubjectSos {
        subject_id: SubjectId,
        active: bool,
        respond_to: oneshot::Sender<Result<Subject, StoreError>>,
    },
}

// ============================================================================
// Store Errors
// ============================================================================

/// Errors a datastore can report.
///
/// Read paths only ever fail with `Unavailable`; write paths may also be
/// rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The datastore could not be reached or did not answer.
    #[error("datastore unavailable: {0}")]
    Unavailable(String),

    /// The write violated a constraint or lacked a required field.
    #[error("write rejected: {0}")]
    Rejected(String),

    /// The record to update does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A record with this id already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Capacity reached.
    #[error("datastore is full (max: {max} records)")]
    Full {
        /// Maximum number of records allowed
        max: usize,
    },
}

impl StoreError {
    /// Creates a rejection from any displayable cause.
    pub fn rejected<E: std::fmt::Display>(err: E) -> Self {
        Self::Rejected(err.to_string())
    }

    /// The error every handle method returns once the actor is gone.
    pub(crate) fn channel_closed() -> Self {
        Self::Unavailable("store actor channel closed".to_string())
    }
}
