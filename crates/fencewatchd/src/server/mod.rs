//! TCP server for the fencewatch daemon.
//!
//! The server:
//! - Listens on a TCP address for client connections
//! - Registers every accepted connection as an observer
//! - Spawns a ConnectionHandler for each client
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   FenceServer   │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  Orchestrator   │
//! │   (per client)  │     │                 │
//! └───────┬─────────┘     └────────┬────────┘
//!         │ outbox                 │ broadcast
//!         ▼                        ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │  writer task    │◀────│ ObserverRegistry│
//! │  (per client)   │     │                 │
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Server errors are logged and allow continued operation

mod connection;

pub use connection::{ConnectionError, ConnectionHandler, ConnectionSettings, MAX_MESSAGE_SIZE};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use fencewatch_protocol::ReplyMessage;

use crate::config::{ConfigError, DaemonConfig};
use crate::observer::{ChannelObserver, ObserverId};
use crate::orchestrator::Orchestrator;

/// TCP server for the fencewatch daemon.
pub struct FenceServer {
    listener: TcpListener,

    orchestrator: Orchestrator,

    settings: ConnectionSettings,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for generating observer IDs
    connection_counter: AtomicU64,
}

impl FenceServer {
    /// Binds the listen address from `config`.
    ///
    /// Binding happens here rather than in [`run`](Self::run) so callers
    /// can read the actual address when asking for port 0.
    pub async fn bind(
        config: &DaemonConfig,
        orchestrator: Orchestrator,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let addr = config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_string(),
                error: e.to_string(),
            })?;

        Ok(Self {
            listener,
            orchestrator,
            settings: ConnectionSettings::from(config),
            cancel_token,
            connection_counter: AtomicU64::new(0),
        })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Io(e.to_string()))
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered, then
    /// closes every observer.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(addr = ?self.listener.local_addr().ok(), "Fence server listening");

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, peer, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        self.cleanup().await;
        Ok(())
    }

    /// Registers the connection as an observer and spawns its handler.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, connection_number: u64) {
        let orchestrator = self.orchestrator.clone();
        let settings = self.settings;
        let shutdown = self.cancel_token.clone();

        tokio::spawn(async move {
            let (reader, writer) = stream.into_split();
            let id = ObserverId::new(connection_number);
            debug!(observer_id = %id, peer = %peer, "Accepted connection");

            let (observer, outbox) = ChannelObserver::new(id, settings.outbox_capacity);
            let observer = Arc::new(observer);
            let close = observer.cancellation_token();
            let mut writer_task = observer.spawn_writer(outbox, writer, settings.write_timeout);

            let hub = orchestrator.hub().clone();
            let registry = Arc::clone(hub.registry());

            match registry.add(observer.clone()).await {
                Ok(()) => {
                    let handler = ConnectionHandler::new(
                        reader,
                        observer,
                        orchestrator,
                        settings.idle_timeout,
                        shutdown,
                    );
                    handler.run().await;
                    registry.remove(id).await;
                }
                Err(e) => {
                    connection::log_rejected(&observer, &e);
                    hub.send_to(&*observer, &ReplyMessage::error(e.to_string())).await;
                    drop(observer);
                }
            }

            // Let the writer flush what is queued; it stops once every
            // sender is gone
            if timeout(settings.write_timeout, &mut writer_task).await.is_err() {
                close.cancel();
                let _ = writer_task.await;
            }
            debug!(observer_id = %id, "Connection finished");
        });
    }

    /// Performs cleanup on shutdown.
    async fn cleanup(&self) {
        let closed = self.orchestrator.hub().registry().clear().await;
        info!(observers = closed, "Server cleanup complete");
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: String, error: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(String),
}
