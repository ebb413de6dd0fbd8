//! Connected observers and the set that tracks them.
//!
//! An observer is anything that accepts encoded frames: a TCP client in
//! production, a plain channel in tests. The hub only ever talks to the
//! [`ObserverConnection`] capability, so it never learns which one it has.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Delivery failures are values (`DeliveryError`), never panics

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

mod channel;
mod registry;

pub use channel::ChannelObserver;
pub use registry::{ObserverRegistry, RegistryError, DEFAULT_MAX_OBSERVERS};

/// One encoded message, shared by every recipient of a broadcast.
pub type Frame = Arc<str>;

/// Identity of a connected observer.
///
/// Assigned by the server from its connection counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

/// Why a frame could not be handed to an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The observer disconnected or was told to close.
    #[error("observer is closed")]
    Closed,

    /// The observer's outbox is full; it is not keeping up.
    #[error("observer outbox is full")]
    Backpressure,

    /// A write to the observer stalled past the write timeout.
    #[error("observer write timed out")]
    Timeout,
}

/// A live connection that can receive frames.
///
/// `send` must not block: implementations queue the frame and return, or
/// fail immediately. Frames sent to one observer arrive in the order they
/// were sent, or not at all.
pub trait ObserverConnection: Send + Sync {
    fn id(&self) -> ObserverId;

    /// Whether the observer still accepts frames.
    fn is_open(&self) -> bool;

    /// Queue a frame for delivery.
    fn send(&self, frame: Frame) -> Result<(), DeliveryError>;

    /// Ask the observer to shut down. Idempotent.
    fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_id_display() {
        assert_eq!(ObserverId::new(7).to_string(), "observer-7");
        assert_eq!(ObserverId::new(7).as_u64(), 7);
    }

    #[test]
    fn test_delivery_error_display() {
        assert_eq!(DeliveryError::Backpressure.to_string(), "observer outbox is full");
        assert_eq!(DeliveryError::Timeout.to_string(), "observer write timed out");
    }
}
