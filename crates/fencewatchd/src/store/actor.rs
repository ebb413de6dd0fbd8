//! Store actor - owns all subject and geofence records.
//!
//! The in-memory reference datastore. It receives commands via an mpsc
//! channel and answers each one over its oneshot, processing them one at a
//! time. That sequential loop is the serialization point for concurrent
//! writes: the last command to arrive wins.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Responses to dropped callers are ignored, never unwrapped

use std::collections::{BTreeMap, HashMap};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use fencewatch_core::{
    Geofence, GeofenceDraft, GeofenceId, Point, Subject, SubjectId, SubjectRegistration,
    ZoneStatus,
};

use super::commands::{StoreCommand, StoreError};

// ============================================================================
// Resource Limits
// ============================================================================

/// Maximum number of subjects the store can hold.
pub const MAX_SUBJECTS: usize = 10_000;

/// Maximum number of geofences the store can hold.
pub const MAX_GEOFENCES: usize = 1_000;

// ============================================================================
// Store Actor
// ============================================================================

/// The store actor - owns all records.
///
/// # Ownership
///
/// Records are kept in `BTreeMap`s keyed by an insertion sequence so
/// listings come back in creation order, with a `HashMap` index from the
/// public id to that sequence for O(1) lookups.
pub struct StoreActor {
    /// Command receiver
    receiver: mpsc::Receiver<StoreCommand>,

    /// Geofences by insertion sequence
    geofences: BTreeMap<u64, Geofence>,

    /// Index for geofence id -> sequence lookups
    geofence_index: HashMap<GeofenceId, u64>,

    /// Subjects by insertion sequence
    subjects: BTreeMap<u64, Subject>,

    /// Index for subject id -> sequence lookups
    subject_index: HashMap<SubjectId, u64>,

    /// Next geofence sequence; geofence ids are rendered from it
    next_geofence_seq: u64,

    /// Next subject sequence
    next_subject_seq: u64,
}

impl StoreActor {
    /// Creates a new, empty store actor.
    pub fn new(receiver: mpsc::Receiver<StoreCommand>) -> Self {
        Self {
            receiver,
            geofences: BTreeMap::new(),
            geofence_index: HashMap::new(),
            subjects: BTreeMap::new(),
            subject_index: HashMap::new(),
            next_geofence_seq: 1,
            next_subject_seq: 1,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped).
    pub async fn run(mut self) {
        info!("Store actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(
            subjects = self.subjects.len(),
            geofences = self.geofences.len(),
            "Store actor stopped"
        );
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: StoreCommand) {
        match cmd {
            StoreCommand::ListGeofences { respond_to } => {
                let _ = respond_to.send(self.geofences.values().cloned().collect());
            }
            StoreCommand::UpsertGeofence { draft, respond_to } => {
                let result = self.handle_upsert_geofence(draft);
                // Ignore send error - caller may have given up
                let _ = respond_to.send(result);
            }
            StoreCommand::DeleteGeofence {
                geofence_id,
                respond_to,
            } => {
                let result = self.handle_delete_geofence(&geofence_id);
                let _ = respond_to.send(result);
            }
            StoreCommand::ListSubjects { respond_to } => {
                let _ = respond_to.send(self.subjects.values().cloned().collect());
            }
            StoreCommand::CreateSubject {
                registration,
                respond_to,
            } => {
                let result = self.handle_create_subject(*registration);
                let _ = respond_to.send(result);
            }
            StoreCommand::UpsertSubjectLocation {
                subject_id,
                location,
                status,
                respond_to,
            } => {
                let result = self.handle_upsert_location(subject_id, location, status);
                let _ = respond_to.send(result);
            }
            StoreCommand::UpdateSubjectStatusIfAt {
                subject_id,
                expected_location,
                status,
                respond_to,
            } => {
                let result = self.handle_status_if_at(&subject_id, expected_location, status);
                let _ = respond_to.send(result);
            }
            StoreCommand::UpsertSubjectSos {
                subject_id,
                active,
                respond_to,
            } => {
                let result = self.handle_upsert_sos(&subject_id, active);
                let _ = respond_to.send(result);
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_upsert_geofence(&mut self, draft: GeofenceDraft) -> Result<Geofence, StoreError> {
        draft.validate().map_err(StoreError::rejected)?;

        match draft.id.clone() {
            Some(id) => {
                let seq = self
                    .geofence_index
                    .get(&id)
                    .copied()
                    .ok_or_else(|| StoreError::NotFound(format!("geofence {id}")))?;
                let geofence = draft.into_geofence(id);
                self.geofences.insert(seq, geofence.clone());

                info!(
                    geofence_id = %geofence.id,
                    radius_meters = geofence.radius_meters,
                    "Geofence updated"
                );
                Ok(geofence)
            }
            None => {
                if self.geofences.len() >= MAX_GEOFENCES {
                    warn!(max = MAX_GEOFENCES, "Store is full, rejecting geofence");
                    return Err(StoreError::Full { max: MAX_GEOFENCES });
                }

                let seq = self.next_geofence_seq;
                self.next_geofence_seq = seq.saturating_add(1);
                let id = GeofenceId::new(seq.to_string());
                let geofence = draft.into_geofence(id.clone());
                self.geofences.insert(seq, geofence.clone());
                self.geofence_index.insert(id, seq);

                info!(
                    geofence_id = %geofence.id,
                    name = %geofence.name,
                    total_geofences = self.geofences.len(),
                    "Geofence created"
                );
                Ok(geofence)
            }
        }
    }

    fn handle_delete_geofence(&mut self, id: &GeofenceId) -> Result<(), StoreError> {
        let seq = self
            .geofence_index
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(format!("geofence {id}")))?;
        self.geofences.remove(&seq);

        info!(
            geofence_id = %id,
            remaining_geofences = self.geofences.len(),
            "Geofence deleted"
        );
        Ok(())
    }

    fn handle_create_subject(
        &mut self,
        registration: SubjectRegistration,
    ) -> Result<Subject, StoreError> {
        if self.subject_index.contains_key(&registration.id) {
            debug!(subject_id = %registration.id, "Subject already exists, rejecting registration");
            return Err(StoreError::AlreadyExists(format!(
                "subject {}",
                registration.id
            )));
        }
        registration
            .location
            .ensure_finite()
            .map_err(StoreError::rejected)?;

        let subject = registration.into_subject();
        self.insert_subject(subject.clone())?;

        info!(
            subject_id = %subject.id,
            total_subjects = self.subjects.len(),
            "Subject registered"
        );
        Ok(subject)
    }

    /// Relocates an existing subject or creates it. Name, token and SOS
    /// state of an existing subject are left untouched.
    fn handle_upsert_location(
        &mut self,
        subject_id: SubjectId,
        location: Point,
        status: ZoneStatus,
    ) -> Result<Subject, StoreError> {
        location.ensure_finite().map_err(StoreError::rejected)?;

        if let Some(subject) = self.subject_mut(&subject_id) {
            subject.relocate(location, status);
            debug!(
                subject_id = %subject_id,
                location = %location,
                status = %status,
                "Subject location updated"
            );
            return Ok(subject.clone());
        }

        let mut subject = Subject::new(subject_id, location);
        subject.status = status;
        self.insert_subject(subject.clone())?;

        info!(
            subject_id = %subject.id,
            total_subjects = self.subjects.len(),
            "Subject created from first location report"
        );
        Ok(subject)
    }

    /// Compare-and-set on location: the status is only written while the
    /// stored position is the one it was evaluated against.
    fn handle_status_if_at(
        &mut self,
        subject_id: &SubjectId,
        expected_location: Point,
        status: ZoneStatus,
    ) -> Result<Option<Subject>, StoreError> {
        let subject = self
            .subject_mut(subject_id)
            .ok_or_else(|| StoreError::NotFound(format!("subject {subject_id}")))?;

        if subject.location != expected_location {
            debug!(
                subject_id = %subject_id,
                expected = %expected_location,
                stored = %subject.location,
                "Subject moved since evaluation, status not written"
            );
            return Ok(None);
        }

        subject.set_status(status);
        debug!(subject_id = %subject_id, status = %status, "Subject status updated");
        Ok(Some(subject.clone()))
    }

    fn handle_upsert_sos(&mut self, subject_id: &SubjectId, active: bool) -> Result<Subject, StoreError> {
        let subject = self
            .subject_mut(subject_id)
            .ok_or_else(|| StoreError::NotFound(format!("subject {subject_id}")))?;
        subject.set_sos(active);

        info!(subject_id = %subject_id, sos_active = active, "SOS signal stored");
        Ok(subject.clone())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn insert_subject(&mut self, subject: Subject) -> Result<(), StoreError> {
        if self.subjects.len() >= MAX_SUBJECTS {
            warn!(
                subject_id = %subject.id,
                max = MAX_SUBJECTS,
                "Store is full, rejecting subject"
            );
            return Err(StoreError::Full { max: MAX_SUBJECTS });
        }
        let seq = self.next_subject_seq;
        self.next_subject_seq = seq.saturating_add(1);
        self.subject_index.insert(subject.id.clone(), seq);
        self.subjects.insert(seq, subject);
        Ok(())
    }

    fn subject_mut(&mut self, id: &SubjectId) -> Option<&mut Subject> {
        let seq = self.subject_index.get(id)?;
        self.subjects.get_mut(seq)
    }

    // ========================================================================
    // Accessors (for testing)
    // ========================================================================

    #[cfg(test)]
    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    #[cfg(test)]
    pub fn geofence_count(&self) -> usize {
        self.geofences.len()
    }
}
