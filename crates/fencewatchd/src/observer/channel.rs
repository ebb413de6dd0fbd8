//! Observer backed by a bounded outbox.
//!
//! Each observer owns one FIFO queue and at most one writer task draining
//! it, which is what gives per-observer ordering. `send` never waits: a
//! full queue is reported as `Backpressure` and the hub drops the observer.
//!
//! ```text
//! hub.broadcast ──try_send──▶ [outbox] ──▶ writer task ──▶ socket
//!                                              │
//!                                   error/timeout → cancel
//! ```

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{DeliveryError, Frame, ObserverConnection, ObserverId};

/// An observer whose frames go into a bounded mpsc channel.
pub struct ChannelObserver {
    id: ObserverId,
    outbox: mpsc::Sender<Frame>,
    cancel: CancellationToken,

    /// First reason the observer stopped, reported by later sends
    close_reason: Arc<OnceLock<DeliveryError>>,
}

impl ChannelObserver {
    /// Creates an observer and the receiving end of its outbox.
    ///
    /// `capacity` is clamped to at least 1.
    pub fn new(id: ObserverId, capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let observer = Self {
            id,
            outbox: tx,
            cancel: CancellationToken::new(),
            close_reason: Arc::new(OnceLock::new()),
        };
        (observer, rx)
    }

    /// Spawns the task that writes queued frames to `writer`, one per line.
    ///
    /// Each write is bounded by `write_timeout`. A failed or stalled write
    /// closes the observer; remaining frames are discarded.
    pub fn spawn_writer<W>(
        &self,
        outbox: mpsc::Receiver<Frame>,
        writer: W,
        write_timeout: Duration,
    ) -> JoinHandle<()>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let id = self.id;
        let cancel = self.cancel.clone();
        let close_reason = Arc::clone(&self.close_reason);

        tokio::spawn(write_frames(
            id,
            outbox,
            BufWriter::new(writer),
            write_timeout,
            cancel,
            close_reason,
        ))
    }

    /// Token cancelled when this observer closes, for whoever owns the
    /// connection's read side.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolves once the observer has been closed.
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }

    fn stop_reason(&self) -> DeliveryError {
        self.close_reason
            .get()
            .copied()
            .unwrap_or(DeliveryError::Closed)
    }
}

impl ObserverConnection for ChannelObserver {
    fn id(&self) -> ObserverId {
        self.id
    }

    fn is_open(&self) -> bool {
        !self.cancel.is_cancelled() && !self.outbox.is_closed()
    }

    fn send(&self, frame: Frame) -> Result<(), DeliveryError> {
        if self.cancel.is_cancelled() {
            return Err(self.stop_reason());
        }

        self.outbox.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Backpressure,
            TrySendError::Closed(_) => self.stop_reason(),
        })
    }

    fn close(&self) {
        let _ = self.close_reason.set(DeliveryError::Closed);
        self.cancel.cancel();
    }
}

async fn write_frames<W>(
    id: ObserverId,
    mut outbox: mpsc::Receiver<Frame>,
    mut writer: BufWriter<W>,
    write_timeout: Duration,
    cancel: CancellationToken,
    close_reason: Arc<OnceLock<DeliveryError>>,
) where
    W: AsyncWrite + Unpin + Send,
{
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = outbox.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let write = async {
            writer.write_all(frame.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        };

        match timeout(write_timeout, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(observer_id = %id, error = %e, "Observer write failed");
                let _ = close_reason.set(DeliveryError::Closed);
                cancel.cancel();
                break;
            }
            Err(_) => {
                debug!(observer_id = %id, "Observer write timed out");
                let _ = close_reason.set(DeliveryError::Timeout);
                cancel.cancel();
                break;
            }
        }
    }

    outbox.close();
    let _ = timeout(write_timeout, writer.shutdown()).await;
    debug!(observer_id = %id, "Observer writer stopped");
}
