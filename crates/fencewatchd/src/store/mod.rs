//! Datastore seam and the in-memory reference store.
//!
//! Subjects and geofences are owned by a datastore, never cached by the
//! daemon: every evaluation reads a fresh snapshot through [`Datastore`].
//! The bundled implementation is an actor that owns the records and serves
//! commands over a tokio mpsc channel.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   StoreCommand   ┌──────────────┐
//! │ Orchestrator │─────────────────▶│  StoreActor  │
//! │ (StoreHandle)│◀─────────────────│  (records)   │
//! └──────────────┘  oneshot reply   └──────────────┘
//! ```

use async_trait::async_trait;
use tokio::sync::mpsc;

use fencewatch_core::{
    Geofence, GeofenceDraft, GeofenceId, Point, Subject, SubjectId, SubjectRegistration,
    ZoneStatus,
};

mod actor;
mod commands;
mod handle;

pub use actor::{StoreActor, MAX_GEOFENCES, MAX_SUBJECTS};
pub use commands::{StoreCommand, StoreError};
pub use handle::StoreHandle;

/// Channel buffer size
const COMMAND_BUFFER: usize = 100;

/// Persistence operations the orchestrator depends on.
///
/// Writes are upserts keyed by id; the implementation is the serialization
/// point for concurrent writes to the same record.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Every geofence. An empty vector means none exist; failure to read is
    /// an `Err`.
    async fn list_geofences(&self) -> Result<Vec<Geofence>, StoreError>;

    /// Create (`draft.id == None`) or replace a geofence.
    async fn upsert_geofence(&self, draft: GeofenceDraft) -> Result<Geofence, StoreError>;

    async fn delete_geofence(&self, geofence_id: &GeofenceId) -> Result<(), StoreError>;

    /// Every subject.
    async fn list_subjects(&self) -> Result<Vec<Subject>, StoreError>;

    /// Register a subject; fails if the id is taken.
    async fn create_subject(&self, registration: SubjectRegistration) -> Result<Subject, StoreError>;

    /// Write location and status, creating the subject on first report.
    /// Fields not named here are preserved.
    async fn upsert_subject_location(
        &self,
        subject_id: &SubjectId,
        location: Point,
        status: ZoneStatus,
    ) -> Result<Subject, StoreError>;

    /// Write only the status, and only if the subject is still at
    /// `expected_location`. `Ok(None)` means a newer location was stored in
    /// the meantime and nothing was written.
    async fn update_subject_status_if_at(
        &self,
        subject_id: &SubjectId,
        expected_location: Point,
        status: ZoneStatus,
    ) -> Result<Option<Subject>, StoreError>;

    /// Write the SOS signal and stamp its time; fails for unknown subjects.
    async fn upsert_subject_sos(&self, subject_id: &SubjectId, active: bool) -> Result<Subject, StoreError>;
}

/// Spawn the store actor and return a handle for interaction.
///
/// The actor runs until every clone of the handle is dropped.
///
/// # Example
///
/// ```no_run
/// use fencewatchd::store::{spawn_store, Datastore};
///
/// #[tokio::main]
/// async fn main() {
///     let store = spawn_store();
///     let geofences = store.list_geofences().await;
/// }
/// ```
pub fn spawn_store() -> StoreHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = StoreActor::new(cmd_rx);
    tokio::spawn(actor.run());

    StoreHandle::new(cmd_tx)
}
