//! Integration tests for the ObserverRegistry and BroadcastHub.
//!
//! These tests drive the hub through the `ObserverConnection` trait with
//! hand-written observers, so failure modes can be forced exactly.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fencewatch_core::{GeofenceId, Point, Subject, SubjectId};
use fencewatch_protocol::BroadcastMessage;
use fencewatchd::hub::{BroadcastHub, BroadcastReport};
use fencewatchd::observer::{
    ChannelObserver, DeliveryError, Frame, ObserverConnection, ObserverId, ObserverRegistry,
};

// ============================================================================
// Test Helpers
// ============================================================================

/// Observer that records frames, or fails with a fixed error.
struct RecordingObserver {
    id: ObserverId,
    failure: Option<DeliveryError>,
    open: AtomicBool,
    frames: Mutex<Vec<Frame>>,
}

impl RecordingObserver {
    fn healthy(id: u64) -> Arc<Self> {
        Self::build(id, None)
    }

    fn failing(id: u64, error: DeliveryError) -> Arc<Self> {
        Self::build(id, Some(error))
    }

    fn build(id: u64, failure: Option<DeliveryError>) -> Arc<Self> {
        Arc::new(Self {
            id: ObserverId::new(id),
            failure,
            open: AtomicBool::new(true),
            frames: Mutex::new(Vec::new()),
        })
    }

    fn received(&self) -> Vec<String> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|f| f.to_string())
            .collect()
    }
}

impl ObserverConnection for RecordingObserver {
    fn id(&self) -> ObserverId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn send(&self, frame: Frame) -> Result<(), DeliveryError> {
        if !self.is_open() {
            return Err(DeliveryError::Closed);
        }
        if let Some(error) = self.failure {
            return Err(error);
        }
        self.frames.lock().unwrap().push(frame);
        Ok(())
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

fn located(id: &str) -> BroadcastMessage {
    BroadcastMessage::subject_located(&Subject::new(SubjectId::new(id), Point::new(1.0, 2.0)))
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_broadcast_to_empty_registry_is_noop() {
    let registry = Arc::new(ObserverRegistry::default());
    let hub = BroadcastHub::new(Arc::clone(&registry));

    let report = hub.broadcast(&located("t-1")).await;

    assert_eq!(report, BroadcastReport::default());
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_each_failure_mode_is_isolated() {
    let registry = Arc::new(ObserverRegistry::default());
    let good_a = RecordingObserver::healthy(1);
    let closed = RecordingObserver::failing(2, DeliveryError::Closed);
    let slow = RecordingObserver::failing(3, DeliveryError::Backpressure);
    let stalled = RecordingObserver::failing(4, DeliveryError::Timeout);
    let good_b = RecordingObserver::healthy(5);

    for observer in [&good_a, &closed, &slow, &stalled, &good_b] {
        registry.add(observer.clone()).await.unwrap();
    }

    let hub = BroadcastHub::new(Arc::clone(&registry));
    let report = hub.broadcast(&located("t-1")).await;

    assert_eq!(report, BroadcastReport { delivered: 2, failed: 3 });
    assert_eq!(good_a.received().len(), 1);
    assert_eq!(good_b.received().len(), 1);
    assert_eq!(registry.len().await, 2);
    for failed in [&closed, &slow, &stalled] {
        assert!(!failed.is_open(), "failed observer should be closed");
        assert!(!registry.contains(failed.id()).await);
    }

    // A second broadcast only reaches the survivors
    let report = hub.broadcast(&located("t-2")).await;
    assert_eq!(report, BroadcastReport { delivered: 2, failed: 0 });
}

#[tokio::test]
async fn test_removed_observer_never_receives_again() {
    let registry = Arc::new(ObserverRegistry::default());
    let observer = RecordingObserver::healthy(1);
    registry.add(observer.clone()).await.unwrap();
    let hub = BroadcastHub::new(Arc::clone(&registry));

    hub.broadcast(&located("t-1")).await;
    assert!(registry.remove(observer.id()).await);
    assert!(!registry.remove(observer.id()).await);
    hub.broadcast(&located("t-2")).await;

    let received = observer.received();
    assert_eq!(received.len(), 1);
    assert!(received[0].contains("t-1"));
}

#[tokio::test]
async fn test_order_preserved_per_observer() {
    let registry = Arc::new(ObserverRegistry::default());
    let observer = RecordingObserver::healthy(1);
    registry.add(observer.clone()).await.unwrap();
    let hub = BroadcastHub::new(registry);

    for i in 0..10 {
        hub.broadcast(&BroadcastMessage::geofence_deleted(GeofenceId::new(i.to_string())))
            .await;
    }

    let ids: Vec<String> = observer
        .received()
        .iter()
        .map(|f| {
            let v: serde_json::Value = serde_json::from_str(f).unwrap();
            v["geofenceId"].as_str().unwrap().to_string()
        })
        .collect();
    let expected: Vec<String> = (0..10).map(|i| i.to_string()).collect();
    assert_eq!(ids, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_churn_during_broadcast() {
    let registry = Arc::new(ObserverRegistry::new(1_000));
    let hub = BroadcastHub::new(Arc::clone(&registry));
    let steady = RecordingObserver::healthy(0);
    registry.add(steady.clone()).await.unwrap();

    let churn = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            for i in 1..200u64 {
                let observer = RecordingObserver::healthy(i);
                registry.add(observer).await.unwrap();
                registry.remove(ObserverId::new(i)).await;
            }
        })
    };

    let broadcaster = {
        let hub = hub.clone();
        tokio::spawn(async move {
            for i in 0..100 {
                hub.broadcast(&located(&format!("t-{i}"))).await;
            }
        })
    };

    churn.await.unwrap();
    broadcaster.await.unwrap();

    assert_eq!(steady.received().len(), 100);
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_slow_channel_observer_is_dropped() {
    let registry = Arc::new(ObserverRegistry::default());
    let (fast, mut fast_rx) = ChannelObserver::new(ObserverId::new(1), 16);
    let (slow, _slow_rx) = ChannelObserver::new(ObserverId::new(2), 2);
    let fast = Arc::new(fast);
    let slow = Arc::new(slow);
    registry.add(fast.clone()).await.unwrap();
    registry.add(slow.clone()).await.unwrap();

    let hub = BroadcastHub::new(Arc::clone(&registry));
    for i in 0..3 {
        hub.broadcast(&located(&format!("t-{i}"))).await;
    }

    // The slow observer's outbox held two frames; the third overflowed it
    assert!(!registry.contains(slow.id()).await);
    assert!(!slow.is_open());

    let mut delivered = 0;
    while tokio::time::timeout(Duration::from_millis(50), fast_rx.recv())
        .await
        .ok()
        .flatten()
        .is_some()
    {
        delivered += 1;
    }
    assert_eq!(delivered, 3);
}
