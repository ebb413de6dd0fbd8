//! Fan-out of encoded messages to every connected observer.
//!
//! A message is encoded once; the resulting frame is shared by every
//! recipient. Delivery to one observer never waits on another: a closed,
//! full, or stalled observer is removed from the registry and closed, and
//! the rest still receive the frame.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Failures are logged and counted, never returned to the caller

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, trace};

use fencewatch_protocol::{BroadcastMessage, ReplyMessage};

use crate::observer::{Frame, ObserverConnection, ObserverRegistry};

/// Outcome of one broadcast, for diagnostics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Observers that accepted the frame
    pub delivered: usize,

    /// Observers that failed and were removed
    pub failed: usize,
}

/// Delivers messages to the observers in an [`ObserverRegistry`].
#[derive(Clone)]
pub struct BroadcastHub {
    registry: Arc<ObserverRegistry>,
}

impl BroadcastHub {
    pub fn new(registry: Arc<ObserverRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this hub delivers to.
    pub fn registry(&self) -> &Arc<ObserverRegistry> {
        &self.registry
    }

    /// Sends `msg` to every observer registered right now.
    ///
    /// An empty registry is a no-op.
    pub async fn broadcast(&self, msg: &BroadcastMessage) -> BroadcastReport {
        let Some(frame) = encode(msg) else {
            return BroadcastReport::default();
        };

        let observers = self.registry.snapshot().await;
        if observers.is_empty() {
            trace!(kind = msg.kind(), "No observers to notify");
            return BroadcastReport::default();
        }

        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();

        for observer in &observers {
            match observer.send(Arc::clone(&frame)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    debug!(
                        observer_id = %observer.id(),
                        kind = msg.kind(),
                        error = %e,
                        "Failed to deliver to observer"
                    );
                    failed.push(observer);
                }
            }
        }

        report.failed = failed.len();
        for observer in failed {
            self.drop_observer(observer.as_ref()).await;
        }

        debug!(
            kind = msg.kind(),
            delivered = report.delivered,
            failed = report.failed,
            "Broadcast complete"
        );
        report
    }

    /// Sends a reply to a single observer.
    ///
    /// Returns whether the observer accepted it; on failure the observer is
    /// removed and closed just as in [`broadcast`](Self::broadcast).
    pub async fn send_to(&self, observer: &dyn ObserverConnection, msg: &ReplyMessage) -> bool {
        let Some(frame) = encode(msg) else {
            return false;
        };

        match observer.send(frame) {
            Ok(()) => true,
            Err(e) => {
                debug!(observer_id = %observer.id(), error = %e, "Failed to deliver reply");
                self.drop_observer(observer).await;
                false
            }
        }
    }

    async fn drop_observer(&self, observer: &dyn ObserverConnection) {
        observer.close();
        self.registry.remove(observer.id()).await;
    }
}

fn encode<T: Serialize>(msg: &T) -> Option<Frame> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Frame::from(json)),
        Err(e) => {
            error!(error = %e, "Failed to serialize message");
            None
        }
    }
}
