//! Telemetry collector.
//!
//! The collector multiplexes pipeline, rhythm, alarm and delivery events
//! into a bounded history plus an async broadcast stream.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;

pub mod events;

pub use events::{SentinelEvent, SentinelEventKind, SkipReason};

/// Snapshot of collector state for CLI reporting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<SentinelEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
}

/// Broadcast-based collector retaining a bounded history of events.
pub struct TelemetryCollector {
    tx: broadcast::Sender<SentinelEvent>,
    history: Mutex<VecDeque<SentinelEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
        }
    }

    pub fn record(&self, timestamp_ms: u64, kind: SentinelEventKind) {
        self.publish(SentinelEvent { timestamp_ms, kind });
    }

    pub fn publish(&self, event: SentinelEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        if self.history_capacity > 0 {
            let mut history = self.lock_history();
            if history.len() == self.history_capacity {
                history.pop_front();
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            }
            history.push_back(event.clone());
        }

        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SentinelEvent> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let history = self.lock_history();
        TelemetrySnapshot {
            recent: history.iter().cloned().collect(),
            total_events: self.total_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_history.load(Ordering::Relaxed),
        }
    }

    /// Recent events matching `filter`, oldest first
    pub fn recent_matching<F>(&self, filter: F) -> Vec<SentinelEvent>
    where
        F: Fn(&SentinelEventKind) -> bool,
    {
        self.lock_history()
            .iter()
            .filter(|event| filter(&event.kind))
            .cloned()
            .collect()
    }

    fn lock_history(&self) -> MutexGuard<'_, VecDeque<SentinelEvent>> {
        // History is append-only; a poisoned guard still holds valid events
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(256, 64)
    }
}
