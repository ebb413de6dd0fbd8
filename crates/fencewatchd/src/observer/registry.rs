//! The set of currently connected observers.
//!
//! Owned explicitly (behind an `Arc`) by whoever needs it: the hub reads
//! snapshots, the server adds and removes. The lock is taken only inside
//! these methods and never held across a send.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use super::{ObserverConnection, ObserverId};

/// Default limit on concurrently connected observers
pub const DEFAULT_MAX_OBSERVERS: usize = 256;

/// Errors from registry mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Too many observers (max: {max})")]
    Full { max: usize },
}

/// Concurrency-safe set of observers keyed by [`ObserverId`].
pub struct ObserverRegistry {
    observers: RwLock<HashMap<ObserverId, Arc<dyn ObserverConnection>>>,
    max_observers: usize,
}

impl ObserverRegistry {
    /// Creates an empty registry that admits at most `max_observers`.
    pub fn new(max_observers: usize) -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            max_observers,
        }
    }

    /// Adds an observer.
    ///
    /// Re-adding an id that is already present replaces the entry and
    /// does not count against the limit.
    ///
    /// # Errors
    ///
    /// - `RegistryError::Full` if the limit is reached
    pub async fn add(&self, observer: Arc<dyn ObserverConnection>) -> Result<(), RegistryError> {
        let id = observer.id();
        let mut observers = self.observers.write().await;

        if observers.len() >= self.max_observers && !observers.contains_key(&id) {
            return Err(RegistryError::Full {
                max: self.max_observers,
            });
        }

        observers.insert(id, observer);
        debug!(observer_id = %id, observers = observers.len(), "Added observer");
        Ok(())
    }

    /// Removes an observer. Returns whether it was present.
    ///
    /// Removing an absent id is a no-op.
    pub async fn remove(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write().await;
        let removed = observers.remove(&id).is_some();
        if removed {
            debug!(observer_id = %id, observers = observers.len(), "Removed observer");
        }
        removed
    }

    /// Point-in-time copy of the current observers.
    ///
    /// Later adds and removes do not affect a snapshot already taken.
    pub async fn snapshot(&self) -> Vec<Arc<dyn ObserverConnection>> {
        self.observers.read().await.values().cloned().collect()
    }

    pub async fn contains(&self, id: ObserverId) -> bool {
        self.observers.read().await.contains_key(&id)
    }

    /// Number of registered observers.
    pub async fn len(&self) -> usize {
        self.observers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.observers.read().await.is_empty()
    }

    /// Closes and drops every observer. Returns how many there were.
    pub async fn clear(&self) -> usize {
        let drained: Vec<_> = self.observers.write().await.drain().collect();
        for (_, observer) in &drained {
            observer.close();
        }
        drained.len()
    }

    pub fn max_observers(&self) -> usize {
        self.max_observers
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OBSERVERS)
    }
}
