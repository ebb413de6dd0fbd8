//! Connection handler for individual client connections.
//!
//! Every connection is an observer from the moment it is accepted. The
//! handler:
//! - Reads newline-delimited JSON requests; a connection that only listens
//!   is kept open unless an idle timeout is configured
//! - Routes commands to the orchestrator
//! - Replies through the connection's own outbox, so replies and
//!   broadcasts reach the client as one ordered stream
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fencewatch_core::DomainError;
use fencewatch_protocol::{
    decode_client_line, ClientMessage, GeofencePayload, ProtocolError, ReplyMessage,
    TouristPayload,
};

use crate::config::DaemonConfig;
use crate::observer::{ChannelObserver, ObserverConnection, RegistryError};
use crate::orchestrator::{Orchestrator, WorkflowError};

/// Maximum message size (1 MB)
pub const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Per-connection limits, taken from [`DaemonConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub outbox_capacity: usize,

    /// Drop connections silent for this long; `None` keeps them open
    pub idle_timeout: Option<Duration>,

    pub write_timeout: Duration,
}

impl From<&DaemonConfig> for ConnectionSettings {
    fn from(config: &DaemonConfig) -> Self {
        Self {
            outbox_capacity: config.outbox_capacity,
            idle_timeout: config.idle_timeout(),
            write_timeout: config.write_timeout(),
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from(&DaemonConfig::default())
    }
}

/// Connection handler for a single client.
pub struct ConnectionHandler<R> {
    /// Buffered reader for incoming messages
    reader: BufReader<R>,

    /// This connection's observer; replies go through its outbox
    observer: Arc<ChannelObserver>,

    orchestrator: Orchestrator,

    /// Idle timeout, if any
    idle_timeout: Option<Duration>,

    /// Server-wide shutdown
    shutdown: CancellationToken,
}

impl<R> ConnectionHandler<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(
        reader: R,
        observer: Arc<ChannelObserver>,
        orchestrator: Orchestrator,
        idle_timeout: Option<Duration>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            observer,
            orchestrator,
            idle_timeout,
            shutdown,
        }
    }

    /// Runs the handler until the client leaves, the observer is closed,
    /// or the server shuts down.
    pub async fn run(mut self) {
        let observer_id = self.observer.id();
        debug!(observer_id = %observer_id, "Client connected");

        if let Err(e) = self.process_messages().await {
            debug!(observer_id = %observer_id, error = %e, "Connection closed");
        }

        info!(observer_id = %observer_id, "Client disconnected");
    }

    /// Main message processing loop.
    async fn process_messages(&mut self) -> Result<(), ConnectionError> {
        let shutdown = self.shutdown.clone();
        let closed = self.observer.cancellation_token();

        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = closed.cancelled() => return Err(ConnectionError::ObserverClosed),
                result = self.next_line() => match result {
                    Ok(line) => line,
                    Err(ConnectionError::Eof) => {
                        debug!(observer_id = %self.observer.id(), "Client sent EOF");
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                },
            };

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let reply = match self.handle_line(&line).await {
                Ok(reply) => reply,
                Err(e) => {
                    debug!(observer_id = %self.observer.id(), error = %e, "Request failed");
                    ReplyMessage::error(e.to_string())
                }
            };

            if !self
                .orchestrator
                .hub()
                .send_to(&*self.observer, &reply)
                .await
            {
                return Err(ConnectionError::ObserverClosed);
            }
        }
    }

    /// Reads the next line, bounded by the idle timeout when one is set.
    async fn next_line(&mut self) -> Result<Vec<u8>, ConnectionError> {
        match self.idle_timeout {
            Some(idle) => timeout(idle, self.read_line())
                .await
                .map_err(|_| ConnectionError::Timeout)?,
            None => self.read_line().await,
        }
    }

    /// Reads one raw line, refusing anything longer than `MAX_MESSAGE_SIZE`.
    ///
    /// Bytes are decoded later so that invalid UTF-8 is answered with an
    /// error reply instead of dropping the connection.
    async fn read_line(&mut self) -> Result<Vec<u8>, ConnectionError> {
        let mut line = Vec::new();
        let limit = MAX_MESSAGE_SIZE as u64 + 1;

        let bytes_read = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut line)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if bytes_read == 0 {
            return Err(ConnectionError::Eof);
        }

        if line.len() > MAX_MESSAGE_SIZE {
            return Err(ConnectionError::MessageTooLarge {
                size: line.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        Ok(line)
    }

    async fn handle_line(&self, line: &[u8]) -> Result<ReplyMessage, ConnectionError> {
        let msg = decode_client_line(line)?;
        debug!(
            observer_id = %self.observer.id(),
            message_type = msg.kind(),
            "Received message"
        );
        self.dispatch(msg).await
    }

    /// Routes one request to the orchestrator and builds the reply.
    async fn dispatch(&self, msg: ClientMessage) -> Result<ReplyMessage, ConnectionError> {
        let kind = msg.kind();
        let orchestrator = &self.orchestrator;

        let reply = match msg {
            ClientMessage::GetAllTourists => {
                ReplyMessage::all_tourists(&orchestrator.all_subjects().await?)
            }

            ClientMessage::GetAllGeofences => {
                ReplyMessage::all_geofences(&orchestrator.all_geofences().await?)
            }

            ClientMessage::CreateTourist(raw) => {
                let subject = orchestrator.register_subject(raw.to_registration()?).await?;
                ReplyMessage::ack_tourist(kind, TouristPayload::full(&subject))
            }

            ClientMessage::UpdateLocation(raw) => {
                let (subject_id, location) = raw.to_report()?;
                let subject = orchestrator.report_location(&subject_id, location).await?;
                ReplyMessage::ack_tourist(kind, TouristPayload::located(&subject))
            }

            ClientMessage::Sos(raw) => {
                let (subject_id, active) = raw.to_signal()?;
                let subject = orchestrator.set_sos(&subject_id, active).await?;
                ReplyMessage::ack_tourist(kind, TouristPayload::full(&subject))
            }

            ClientMessage::CreateGeofence(raw) => {
                let mutation = orchestrator.save_geofence(raw.to_create_draft()?).await?;
                ReplyMessage::ack_geofence(
                    kind,
                    Some(GeofencePayload::named(&mutation.geofence)),
                    mutation.recheck.rechecked,
                )
            }

            ClientMessage::ModifyGeofence(raw) => {
                let mutation = orchestrator.save_geofence(raw.to_update_draft()?).await?;
                ReplyMessage::ack_geofence(
                    kind,
                    Some(GeofencePayload::named(&mutation.geofence)),
                    mutation.recheck.rechecked,
                )
            }

            ClientMessage::RemoveGeofence(raw) => {
                let recheck = orchestrator.delete_geofence(&raw.to_id()?).await?;
                ReplyMessage::ack_geofence(kind, None, recheck.rechecked)
            }
        };

        Ok(reply)
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("{0}")]
    Protocol(#[from] ProtocolError),

    #[error("Invalid message: {0}")]
    Invalid(#[from] DomainError),

    #[error("{0}")]
    Workflow(#[from] WorkflowError),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Idle timeout")]
    Timeout,

    #[error("Observer closed")]
    ObserverClosed,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Logs a connection that could not be admitted.
pub(crate) fn log_rejected(observer: &ChannelObserver, err: &RegistryError) {
    warn!(observer_id = %observer.id(), error = %err, "Rejecting connection");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::BroadcastHub;
    use crate::observer::{Frame, ObserverId, ObserverRegistry};
    use crate::store::spawn_store;
    use serde_json::Value;
    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio::sync::mpsc;

    struct Harness {
        client: DuplexStream,
        frames: mpsc::Receiver<Frame>,
        shutdown: CancellationToken,
        task: tokio::task::JoinHandle<()>,
    }

    async fn harness() -> Harness {
        harness_with(None).await
    }

    async fn harness_with(idle_timeout: Option<Duration>) -> Harness {
        let registry = Arc::new(ObserverRegistry::default());
        let orchestrator =
            Orchestrator::new(Arc::new(spawn_store()), BroadcastHub::new(Arc::clone(&registry)));

        let (observer, frames) = ChannelObserver::new(ObserverId::new(1), 16);
        let observer = Arc::new(observer);
        registry.add(observer.clone()).await.unwrap();

        let (client, server) = tokio::io::duplex(4096);
        let shutdown = CancellationToken::new();
        let handler = ConnectionHandler::new(
            server,
            observer,
            orchestrator,
            idle_timeout,
            shutdown.clone(),
        );
        let task = tokio::spawn(handler.run());

        Harness {
            client,
            frames,
            shutdown,
            task,
        }
    }

    async fn next(frames: &mut mpsc::Receiver<Frame>) -> Value {
        let frame = frames.recv().await.unwrap();
        serde_json::from_str(&frame).unwrap()
    }

    #[tokio::test]
    async fn test_malformed_line_gets_error_and_connection_stays() {
        let mut h = harness().await;

        h.client.write_all(b"not json\n").await.unwrap();
        assert_eq!(next(&mut h.frames).await["type"], "error");

        h.client.write_all(b"{\"type\":\"getAllTourists\"}\n").await.unwrap();
        let reply = next(&mut h.frames).await;
        assert_eq!(reply["type"], "allTourists");
        assert_eq!(reply["tourists"], serde_json::json!([]));

        h.shutdown.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_update_location_broadcasts_then_acks() {
        let mut h = harness().await;

        h.client
            .write_all(b"{\"type\":\"updateLocation\",\"tourist_id\":\"t-1\",\"lat\":\"1.5\",\"long\":2.5}\n")
            .await
            .unwrap();

        let broadcast = next(&mut h.frames).await;
        assert_eq!(broadcast["type"], "updateTourist");
        assert_eq!(broadcast["tourist"]["lat"], 1.5);

        let ack = next(&mut h.frames).await;
        assert_eq!(ack["type"], "ack");
        assert_eq!(ack["request"], "updateLocation");

        drop(h.client);
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_field_is_reported() {
        let mut h = harness().await;

        h.client
            .write_all(b"{\"type\":\"sos\",\"tourist_id\":\"t-1\",\"sos_signal\":7}\n")
            .await
            .unwrap();
        let reply = next(&mut h.frames).await;
        assert_eq!(reply["type"], "error");

        h.shutdown.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_utf8_gets_error_and_connection_stays() {
        let mut h = harness().await;

        h.client.write_all(b"{\"type\":\"\xff\xfe\"}\n").await.unwrap();
        let reply = next(&mut h.frames).await;
        assert_eq!(reply["type"], "error");
        assert!(reply["message"].as_str().unwrap().contains("UTF-8"));

        h.client.write_all(b"{\"type\":\"getAllGeofences\"}\n").await.unwrap();
        assert_eq!(next(&mut h.frames).await["type"], "allGeofences");

        h.shutdown.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_observer_is_kept_open() {
        let mut h = harness().await;

        // An hour without a single inbound line
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(!h.task.is_finished());

        h.client.write_all(b"{\"type\":\"getAllTourists\"}\n").await.unwrap();
        assert_eq!(next(&mut h.frames).await["type"], "allTourists");

        h.shutdown.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_idle_timeout_closes_connection() {
        let h = harness_with(Some(Duration::from_secs(30))).await;

        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::time::timeout(Duration::from_secs(1), h.task)
            .await
            .expect("handler stops after the idle timeout")
            .unwrap();
    }

    #[test]
    fn test_message_size_error() {
        let err = ConnectionError::MessageTooLarge {
            size: 2_000_000,
            max: MAX_MESSAGE_SIZE,
        };
        assert!(err.to_string().contains("2000000"));
    }

    #[test]
    fn test_settings_from_config() {
        let settings = ConnectionSettings::default();
        assert_eq!(settings.outbox_capacity, 64);
        assert_eq!(settings.idle_timeout, None);
        assert_eq!(settings.write_timeout, Duration::from_secs(10));
    }
}
