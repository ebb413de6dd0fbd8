//! Client interface for the in-memory store actor.
//!
//! `StoreHandle` is cheap to clone and implements [`Datastore`], so the
//! orchestrator talks to it exactly as it would to any other backend.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `StoreError::Unavailable`

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use fencewatch_core::{
    Geofence, GeofenceDraft, GeofenceId, Point, Subject, SubjectId, SubjectRegistration,
    ZoneStatus,
};

use super::commands::{StoreCommand, StoreError};
use super::Datastore;

/// Handle for interacting with the store actor.
#[derive(Clone)]
pub struct StoreHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    /// Create a new store handle.
    pub fn new(sender: mpsc::Sender<StoreCommand>) -> Self {
        Self { sender }
    }

    /// Sends a command built around a fresh oneshot and awaits the answer.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> StoreCommand,
    ) -> Result<T, StoreError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(build(tx))
            .await
            .map_err(|_| StoreError::channel_closed())?;

        rx.await.map_err(|_| StoreError::channel_closed())
    }

    /// Check if the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[async_trait]
impl Datastore for StoreHandle {
    async fn list_geofences(&self) -> Result<Vec<Geofence>, StoreError> {
        self.request(|respond_to| StoreCommand::ListGeofences { respond_to })
            .await
    }

    async fn upsert_geofence(&self, draft: GeofenceDraft) -> Result<Geofence, StoreError> {
        self.request(|respond_to| StoreCommand::UpsertGeofence { draft, respond_to })
            .await?
    }

    async fn delete_geofence(&self, geofence_id: &GeofenceId) -> Result<(), StoreError> {
        let geofence_id = geofence_id.clone();
        self.request(|respond_to| StoreCommand::DeleteGeofence {
            geofence_id,
            respond_to,
        })
        .await?
    }

    async fn list_subjects(&self) -> Result<Vec<Subject>, StoreError> {
        self.request(|respond_to| StoreCommand::ListSubjects { respond_to })
            .await
    }

    async fn create_subject(&self, registration: SubjectRegistration) -> Result<Subject, StoreError> {
        self.request(|respond_to| StoreCommand::CreateSubject {
            registration: Box::new(registration),
            respond_to,
        })
        .await?
    }

    async fn upsert_subject_location(
        &self,
        subject_id: &SubjectId,
        location: Point,
        status: ZoneStatus,
    ) -> Result<Subject, StoreError> {
        let subject_id = subject_id.clone();
        self.request(|respond_to| StoreCommand::UpsertSubjectLocation {
            subject_id,
            location,
            status,
            respond_to,
        })
        .await?
    }

    async fn update_subject_status_if_at(
        &self,
        subject_id: &SubjectId,
        expected_location: Point,
        status: ZoneStatus,
    ) -> Result<Option<Subject>, StoreError> {
        let subject_id = subject_id.clone();
        self.request(|respond_to| StoreCommand::UpdateSubjectStatusIfAt {
            subject_id,
            expected_location,
            status,
            respond_to,
        })
        .await?
    }

    async fn upsert_subject_sos(&self, subject_id: &SubjectId, active: bool) -> Result<Subject, StoreError> {
        let subject_id = subject_id.clone();
        self.request(|respond_to| StoreCommand::UpsertSubjectSos {
            subject_id,
            active,
            respond_to,
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_handle() -> (StoreHandle, mpsc::Receiver<StoreCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        (StoreHandle::new(cmd_tx), cmd_rx)
    }

    #[tokio::test]
    async fn test_handle_is_clone() {
        let (handle, _rx) = create_test_handle();
        let _cloned = handle.clone();
    }

    #[tokio::test]
    async fn test_list_geofences_sends_command() {
        let (handle, mut rx) = create_test_handle();

        let cmd_handler = tokio::spawn(async move {
            if let Some(StoreCommand::ListGeofences { respond_to }) = rx.recv().await {
                let _ = respond_to.send(vec![]);
                return true;
            }
            false
        });

        let result = handle.list_geofences().await;
        assert_eq!(result, Ok(vec![]));
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_reads_fail_when_actor_gone() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        assert!(matches!(
            handle.list_geofences().await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            handle.list_subjects().await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn test_dropped_responder_is_unavailable() {
        let (handle, mut rx) = create_test_handle();

        tokio::spawn(async move {
            // Receive and drop the command without answering
            let _ = rx.recv().await;
        });

        let result = handle
            .upsert_subject_sos(&SubjectId::new("t-1"), true)
            .await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_write_error_passes_through() {
        let (handle, mut rx) = create_test_handle();

        tokio::spawn(async move {
            if let Some(StoreCommand::UpsertSubjectSos { respond_to, .. }) = rx.recv().await {
                let _ = respond_to.send(Err(StoreError::NotFound("subject t-1".to_string())));
            }
        });

        let result = handle
            .upsert_subject_sos(&SubjectId::new("t-1"), true)
            .await;
        assert_eq!(result, Err(StoreError::NotFound("subject t-1".to_string())));
    }

    #[tokio::test]
    async fn test_conditional_status_forwards_expected_location() {
        let (handle, mut rx) = create_test_handle();

        let cmd_handler = tokio::spawn(async move {
            match rx.recv().await {
                Some(StoreCommand::UpdateSubjectStatusIfAt {
                    expected_location,
                    status,
                    respond_to,
                    ..
                }) => {
                    let _ = respond_to.send(Ok(None));
                    Some((expected_location, status))
                }
                _ => None,
            }
        });

        let result = handle
            .update_subject_status_if_at(&SubjectId::new("t-1"), Point::new(1.0, 2.0), ZoneStatus::Inside)
            .await;
        assert_eq!(result, Ok(None));
        assert_eq!(
            cmd_handler.await.unwrap(),
            Some((Point::new(1.0, 2.0), ZoneStatus::Inside))
        );
    }
}
