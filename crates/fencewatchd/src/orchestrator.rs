//! Workflows that tie the datastore, the evaluator and the hub together.
//!
//! Every workflow follows the same order: read what it needs, write the
//! result back, and only then broadcast. A failed read or write stops the
//! workflow before anything is broadcast.
//!
//! ```text
//! report_location ──▶ list_geofences ──▶ evaluate ──▶ upsert ──▶ broadcast
//!
//! save_geofence ──▶ upsert_geofence ──▶ broadcast ──▶ recheck_all
//!                                                        │
//!                 for each subject: evaluate, write status if unmoved, broadcast
//! ```
//!
//! A recheck never writes a location. If a report moves a subject while
//! the recheck is evaluating it, the recheck's status is dropped: the
//! report already stored and broadcast the newer position.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Per-subject recheck failures are collected, never propagated

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use fencewatch_core::{
    evaluate_with, Evaluation, Geofence, GeofenceDraft, GeofenceId, Point, Subject, SubjectId,
    SubjectRegistration,
};
use fencewatch_protocol::BroadcastMessage;

use crate::hub::BroadcastHub;
use crate::store::{Datastore, StoreError};

// ============================================================================
// Errors
// ============================================================================

/// Errors a workflow reports to whoever triggered it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkflowError {
    /// A datastore read failed.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// The datastore refused a subject write.
    #[error("failed to write subject {subject_id}: {reason}")]
    SubjectWriteFailed { subject_id: SubjectId, reason: String },

    /// The datastore refused a geofence write.
    #[error("failed to write geofence: {reason}")]
    GeofenceWriteFailed { reason: String },
}

impl WorkflowError {
    fn unavailable(err: StoreError) -> Self {
        Self::DataUnavailable(err.to_string())
    }

    fn subject_write(subject_id: &SubjectId, err: StoreError) -> Self {
        Self::SubjectWriteFailed {
            subject_id: subject_id.clone(),
            reason: err.to_string(),
        }
    }

    fn geofence_write(err: StoreError) -> Self {
        Self::GeofenceWriteFailed {
            reason: err.to_string(),
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Result of re-evaluating every stored subject.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecheckReport {
    /// Subjects re-evaluated, written back and broadcast
    pub rechecked: usize,

    /// Subjects that moved while being rechecked and were left to the newer
    /// report
    pub superseded: usize,

    /// Subjects whose recheck failed, with the reason
    pub failed: Vec<(SubjectId, WorkflowError)>,

    /// Set when the subject list itself could not be read
    pub listing_error: Option<WorkflowError>,
}

impl RecheckReport {
    fn listing_failed(err: WorkflowError) -> Self {
        Self {
            listing_error: Some(err),
            ..Self::default()
        }
    }

    fn record(
        mut self,
        subject_id: SubjectId,
        outcome: Result<Option<Subject>, WorkflowError>,
    ) -> Self {
        match outcome {
            Ok(Some(_)) => self.rechecked += 1,
            Ok(None) => self.superseded += 1,
            Err(e) => self.failed.push((subject_id, e)),
        }
        self
    }

    /// True when no subject failed. Superseded subjects count as handled.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.listing_error.is_none()
    }
}

/// A saved geofence and the recheck it triggered.
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceMutation {
    pub geofence: Geofence,
    pub recheck: RecheckReport,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs the tracking workflows. Cheap to clone; one per connection.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn Datastore>,
    hub: BroadcastHub,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn Datastore>, hub: BroadcastHub) -> Self {
        Self { store, hub }
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    /// Records a new position for a subject and notifies observers.
    ///
    /// The first report for an unknown id creates the subject.
    ///
    /// # Errors
    ///
    /// - `WorkflowError::DataUnavailable` if geofences cannot be read;
    ///   nothing is written or broadcast
    /// - `WorkflowError::SubjectWriteFailed` if the write is rejected;
    ///   nothing is broadcast
    pub async fn report_location(
        &self,
        subject_id: &SubjectId,
        location: Point,
    ) -> Result<Subject, WorkflowError> {
        let subject = self.locate(subject_id, location).await?;
        info!(
            subject_id = %subject.id,
            location = %subject.location,
            status = %subject.status,
            "Location reported"
        );
        Ok(subject)
    }

    /// Creates or updates a geofence, then rechecks every subject.
    ///
    /// # Errors
    ///
    /// - `WorkflowError::GeofenceWriteFailed` if the write is rejected;
    ///   nothing is broadcast and no recheck runs
    pub async fn save_geofence(&self, draft: GeofenceDraft) -> Result<GeofenceMutation, WorkflowError> {
        let creating = draft.id.is_none();
        let geofence = self
            .store
            .upsert_geofence(draft)
            .await
            .map_err(WorkflowError::geofence_write)?;

        self.hub
            .broadcast(&BroadcastMessage::geofence_updated(&geofence))
            .await;
        info!(
            geofence_id = %geofence.id,
            name = %geofence.name,
            radius_meters = geofence.radius_meters,
            created = creating,
            "Geofence saved"
        );

        let recheck = self.recheck_all().await;
        Ok(GeofenceMutation { geofence, recheck })
    }

    /// Deletes a geofence, then rechecks every subject.
    ///
    /// # Errors
    ///
    /// - `WorkflowError::GeofenceWriteFailed` if the id is unknown or the
    ///   delete is rejected
    pub async fn delete_geofence(&self, geofence_id: &GeofenceId) -> Result<RecheckReport, WorkflowError> {
        self.store
            .delete_geofence(geofence_id)
            .await
            .map_err(WorkflowError::geofence_write)?;

        self.hub
            .broadcast(&BroadcastMessage::geofence_deleted(geofence_id.clone()))
            .await;
        info!(geofence_id = %geofence_id, "Geofence deleted");

        Ok(self.recheck_all().await)
    }

    /// Re-evaluates every stored subject at its stored location.
    ///
    /// Each subject is handled on its own: a failure is logged and
    /// recorded, and the rest are still rechecked.
    pub async fn recheck_all(&self) -> RecheckReport {
        let subjects = match self.store.list_subjects().await {
            Ok(subjects) => subjects,
            Err(e) => {
                let err = WorkflowError::unavailable(e);
                warn!(error = %err, "Recheck skipped: subjects unavailable");
                return RecheckReport::listing_failed(err);
            }
        };

        let mut report = RecheckReport::default();
        for subject in subjects {
            let outcome = self.recheck_subject(&subject).await;
            if let Err(ref e) = outcome {
                warn!(subject_id = %subject.id, error = %e, "Recheck failed for subject");
            }
            report = report.record(subject.id, outcome);
        }

        info!(
            rechecked = report.rechecked,
            superseded = report.superseded,
            failed = report.failed.len(),
            "Recheck complete"
        );
        report
    }

    /// Raises or clears a subject's SOS signal and notifies observers.
    ///
    /// # Errors
    ///
    /// - `WorkflowError::SubjectWriteFailed` if the subject is unknown or
    ///   the write is rejected; nothing is broadcast
    pub async fn set_sos(&self, subject_id: &SubjectId, active: bool) -> Result<Subject, WorkflowError> {
        let subject = self
            .store
            .upsert_subject_sos(subject_id, active)
            .await
            .map_err(|e| WorkflowError::subject_write(subject_id, e))?;

        self.hub
            .broadcast(&BroadcastMessage::subject_full(&subject))
            .await;

        if active {
            warn!(subject_id = %subject.id, location = %subject.location, "SOS raised");
        } else {
            info!(subject_id = %subject.id, "SOS cleared");
        }
        Ok(subject)
    }

    /// Registers a subject ahead of its first location report.
    ///
    /// Observers are not notified; they learn about the subject on its
    /// first report or through `getAllTourists`.
    ///
    /// # Errors
    ///
    /// - `WorkflowError::SubjectWriteFailed` if the id is taken or the
    ///   write is rejected
    pub async fn register_subject(
        &self,
        registration: SubjectRegistration,
    ) -> Result<Subject, WorkflowError> {
        let subject_id = registration.id.clone();
        let subject = self
            .store
            .create_subject(registration)
            .await
            .map_err(|e| WorkflowError::subject_write(&subject_id, e))?;

        info!(subject_id = %subject.id, "Subject registered");
        Ok(subject)
    }

    /// Every stored subject.
    pub async fn all_subjects(&self) -> Result<Vec<Subject>, WorkflowError> {
        self.store
            .list_subjects()
            .await
            .map_err(WorkflowError::unavailable)
    }

    /// Every stored geofence.
    pub async fn all_geofences(&self) -> Result<Vec<Geofence>, WorkflowError> {
        self.store
            .list_geofences()
            .await
            .map_err(WorkflowError::unavailable)
    }

    /// Evaluates against a fresh geofence set.
    async fn evaluate(&self, location: Point) -> Result<Evaluation, WorkflowError> {
        let loaded = self.store.list_geofences().await;
        evaluate_with(location, || loaded).map_err(WorkflowError::unavailable)
    }

    /// Evaluate, write back, broadcast.
    async fn locate(&self, subject_id: &SubjectId, location: Point) -> Result<Subject, WorkflowError> {
        let evaluation = self.evaluate(location).await?;

        let subject = self
            .store
            .upsert_subject_location(subject_id, location, evaluation.aggregate)
            .await
            .map_err(|e| WorkflowError::subject_write(subject_id, e))?;

        let report = self
            .hub
            .broadcast(&BroadcastMessage::subject_located(&subject))
            .await;
        debug!(
            subject_id = %subject.id,
            status = %subject.status,
            inside = evaluation.inside_ids().count(),
            delivered = report.delivered,
            "Subject evaluated"
        );

        Ok(subject)
    }

    /// Re-evaluates one subject at the location it was listed with.
    ///
    /// Only the status is written, and only while that location is still
    /// the stored one. `None` means a newer report got there first.
    async fn recheck_subject(&self, listed: &Subject) -> Result<Option<Subject>, WorkflowError> {
        let evaluation = self.evaluate(listed.location).await?;

        let written = self
            .store
            .update_subject_status_if_at(&listed.id, listed.location, evaluation.aggregate)
            .await
            .map_err(|e| WorkflowError::subject_write(&listed.id, e))?;

        let Some(subject) = written else {
            debug!(subject_id = %listed.id, "Subject moved during recheck, keeping newer report");
            return Ok(None);
        };

        let report = self
            .hub
            .broadcast(&BroadcastMessage::subject_located(&subject))
            .await;
        debug!(
            subject_id = %subject.id,
            status = %subject.status,
            delivered = report.delivered,
            "Subject rechecked"
        );

        Ok(Some(subject))
    }
}
