//! Change detection and event dispatch
//!
//! Two fields of the reel model are watched across poll cycles: the roll
//! counter (a changed, non-zero value means a new roll is on the reel) and
//! the completion flag (its falling edge means a roll left the winder).
//! Each qualifying transition is dispatched exactly once, through a bounded
//! per-field queue drained by one worker per field, so dispatch never blocks
//! the poll cycle and events for the same field stay ordered.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::model::ReelState;

/// Kind of a dispatched roll event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    RollStarted,
    RollCompleted,
}

impl EventKind {
    fn label(&self) -> &'static str {
        match self {
            EventKind::RollStarted => "roll_started",
            EventKind::RollCompleted => "roll_completed",
        }
    }
}

/// Natural identifier of a roll event, used for the idempotent sink guard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EventKey {
    pub kind: EventKind,
    pub roll_number: u32,
}

/// A roll event carrying the model snapshot taken at detection time
#[derive(Debug, Clone, Serialize)]
pub struct RollRecord {
    pub kind: EventKind,
    pub roll_number: u32,
    pub recorded_at: DateTime<Utc>,
    pub snapshot: ReelState,
}

impl RollRecord {
    pub fn new(kind: EventKind, roll_number: u32, snapshot: ReelState) -> Self {
        Self {
            kind,
            roll_number,
            recorded_at: Utc::now(),
            snapshot,
        }
    }

    pub fn key(&self) -> EventKey {
        EventKey {
            kind: self.kind,
            roll_number: self.roll_number,
        }
    }

    /// JSON payload for logging and for sink implementations
    pub fn payload(&self) -> serde_json::Value {
        json!({
            "kind": self.kind.label(),
            "roll_number": self.roll_number,
            "recorded_at": self.recorded_at.to_rfc3339(),
            "snapshot": self.snapshot,
        })
    }
}

/// Narrow append-only surface of the downstream store
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Whether a record with this natural key was already appended
    async fn record_exists(&self, key: &EventKey) -> Result<bool>;

    /// Append a new record, returning the stored form
    async fn append(&self, record: RollRecord) -> Result<RollRecord>;
}

/// Watches the counter and completion fields and feeds the dispatch queues
pub struct ChangeDetector {
    prev_counter: u32,
    prev_finished: bool,
    started_tx: mpsc::Sender<RollRecord>,
    completed_tx: mpsc::Sender<RollRecord>,
}

impl ChangeDetector {
    /// Create the detector and its two dispatch workers.
    ///
    /// The workers stop on their own once the detector is dropped and the
    /// queues run dry.
    pub fn spawn(sink: Arc<dyn EventSink>, queue_bound: usize) -> (Self, Vec<JoinHandle<()>>) {
        let (started_tx, started_rx) = mpsc::channel(queue_bound);
        let (completed_tx, completed_rx) = mpsc::channel(queue_bound);

        let workers = vec![
            spawn_dispatch_worker("roll_started", started_rx, Arc::clone(&sink)),
            spawn_dispatch_worker("roll_completed", completed_rx, sink),
        ];

        (
            Self {
                prev_counter: 0,
                prev_finished: false,
                started_tx,
                completed_tx,
            },
            workers,
        )
    }

    /// Compare the freshly decoded state against the previous cycle and
    /// dispatch one event per qualifying transition. Previous values update
    /// unconditionally.
    pub fn observe(&mut self, state: &ReelState) {
        let counter = state.roll_counter;
        if counter != self.prev_counter && counter != 0 {
            info!(roll_number = counter, "new roll on the reel");
            self.dispatch(&self.started_tx, EventKind::RollStarted, counter, state);
        }
        self.prev_counter = counter;

        let finished = state.roll_finished;
        if self.prev_finished && !finished {
            info!(roll_number = counter, "roll completed");
            self.dispatch(&self.completed_tx, EventKind::RollCompleted, counter, state);
        }
        self.prev_finished = finished;
    }

    fn dispatch(
        &self,
        tx: &mpsc::Sender<RollRecord>,
        kind: EventKind,
        roll_number: u32,
        state: &ReelState,
    ) {
        let record = RollRecord::new(kind, roll_number, state.clone());
        if let Err(e) = tx.try_send(record) {
            warn!(
                kind = kind.label(),
                roll_number, "dispatch queue unavailable, event dropped: {e}"
            );
        }
    }
}

fn spawn_dispatch_worker(
    name: &'static str,
    mut rx: mpsc::Receiver<RollRecord>,
    sink: Arc<dyn EventSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            let key = record.key();
            match sink.record_exists(&key).await {
                Ok(true) => {
                    info!(
                        worker = name,
                        roll_number = key.roll_number,
                        "record already exists, duplicate event dropped"
                    );
                    continue;
                },
                Ok(false) => {},
                Err(e) => {
                    error!(worker = name, roll_number = key.roll_number, "existence check failed: {e}");
                    continue;
                },
            }
            match sink.append(record).await {
                Ok(stored) => {
                    debug!(worker = name, payload = %stored.payload(), "record appended");
                },
                Err(e) => {
                    error!(worker = name, roll_number = key.roll_number, "append failed: {e}");
                },
            }
        }
        debug!(worker = name, "dispatch worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct MemorySink {
        records: Mutex<Vec<RollRecord>>,
    }

    impl MemorySink {
        fn keys(&self) -> Vec<EventKey> {
            self.records.lock().iter().map(|r| r.key()).collect()
        }
    }

    #[async_trait]
    impl EventSink for MemorySink {
        async fn record_exists(&self, key: &EventKey) -> Result<bool> {
            Ok(self.records.lock().iter().any(|r| r.key() == *key))
        }

        async fn append(&self, record: RollRecord) -> Result<RollRecord> {
            self.records.lock().push(record.clone());
            Ok(record)
        }
    }

    async fn drain(detector: ChangeDetector, workers: Vec<JoinHandle<()>>) {
        drop(detector);
        for worker in workers {
            worker.await.unwrap();
        }
    }

    fn state_with(counter: u32, finished: bool) -> ReelState {
        ReelState {
            roll_counter: counter,
            roll_finished: finished,
            ..ReelState::default()
        }
    }

    #[tokio::test]
    async fn test_counter_fires_once_per_distinct_nonzero_value() {
        let sink = Arc::new(MemorySink::default());
        let (mut detector, workers) = ChangeDetector::spawn(sink.clone(), 16);

        for _ in 0..5 {
            detector.observe(&state_with(7, false));
        }
        detector.observe(&state_with(8, false));
        detector.observe(&state_with(8, false));
        drain(detector, workers).await;

        let keys = sink.keys();
        assert_eq!(keys.len(), 2);
        assert_eq!(
            keys[0],
            EventKey { kind: EventKind::RollStarted, roll_number: 7 }
        );
        assert_eq!(
            keys[1],
            EventKey { kind: EventKind::RollStarted, roll_number: 8 }
        );
    }

    #[tokio::test]
    async fn test_zero_counter_never_fires() {
        let sink = Arc::new(MemorySink::default());
        let (mut detector, workers) = ChangeDetector::spawn(sink.clone(), 16);

        detector.observe(&state_with(0, false));
        detector.observe(&state_with(5, false));
        // Counter dropping back to zero must not fire either
        detector.observe(&state_with(0, false));
        drain(detector, workers).await;

        assert_eq!(sink.keys().len(), 1);
    }

    #[tokio::test]
    async fn test_completion_fires_on_falling_edge_only() {
        let sink = Arc::new(MemorySink::default());
        let (mut detector, workers) = ChangeDetector::spawn(sink.clone(), 16);

        detector.observe(&state_with(0, false)); // false -> false
        detector.observe(&state_with(0, true)); // rising edge
        detector.observe(&state_with(0, true)); // true -> true
        detector.observe(&state_with(0, false)); // falling edge
        detector.observe(&state_with(0, false)); // false -> false
        drain(detector, workers).await;

        let keys = sink.keys();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].kind, EventKind::RollCompleted);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_duplicate_record_is_dropped_and_logged() {
        let sink = Arc::new(MemorySink::default());
        sink.append(RollRecord::new(
            EventKind::RollStarted,
            7,
            ReelState::default(),
        ))
        .await
        .unwrap();

        let (mut detector, workers) = ChangeDetector::spawn(sink.clone(), 16);
        detector.observe(&state_with(7, false));
        drain(detector, workers).await;

        assert_eq!(sink.records.lock().len(), 1);
        assert!(logs_contain("duplicate event dropped"));
    }

    #[tokio::test]
    async fn test_events_for_one_field_stay_ordered() {
        let sink = Arc::new(MemorySink::default());
        let (mut detector, workers) = ChangeDetector::spawn(sink.clone(), 16);

        for counter in 1..=10u32 {
            detector.observe(&state_with(counter, false));
        }
        drain(detector, workers).await;

        let numbers: Vec<u32> = sink.keys().iter().map(|k| k.roll_number).collect();
        assert_eq!(numbers, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_payload_shape() {
        let record = RollRecord::new(EventKind::RollCompleted, 12, ReelState::default());
        let payload = record.payload();
        assert_eq!(payload["kind"], "roll_completed");
        assert_eq!(payload["roll_number"], 12);
        assert!(payload["snapshot"]["roll_counter"].is_u64());
    }
}
