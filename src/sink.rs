//! Output side of the controller.
//!
//! The controller pushes each filtered sample and each batch report to its
//! sinks and moves on. Sinks are fire-and-forget: there is no backpressure
//! and no delivery guarantee beyond at-most-once per sample. Persistence and
//! live display are external consumers; they subscribe to a
//! [`BroadcastSink`] and render `(index, filtered)` or `(raw, filtered)` as
//! they see fit.

use crate::history::BatchStats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// One polled sample after filtering.
#[derive(Debug, Clone, Serialize)]
pub struct SampleEvent {
    /// Monotonic sample index within the session, starting at 0.
    pub index: u64,
    /// Value as received, or `-1` if nothing usable arrived.
    pub raw: i64,
    /// Moving-average output after pushing `raw`.
    pub filtered: f64,
    /// Raw value was at or above the configured limit.
    pub over_limit: bool,
    /// When the controller recorded the sample.
    pub timestamp: DateTime<Utc>,
}

/// Periodic max/min summary over the filtered history.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Number of samples recorded when the report was taken.
    pub samples: u64,
    /// Extremes over the retained history.
    pub stats: BatchStats,
    /// When the report was taken.
    pub timestamp: DateTime<Utc>,
}

/// Anything the controller publishes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkEvent {
    /// A filtered sample.
    Sample(SampleEvent),
    /// A batch report.
    Report(BatchReport),
}

/// Consumer of controller output.
pub trait SampleSink: Send {
    /// Accept one filtered sample.
    fn record_sample(&mut self, event: &SampleEvent);

    /// Accept one batch report. Ignored by default.
    fn record_report(&mut self, _report: &BatchReport) {}
}

/// Fans controller output out to any number of async subscribers.
///
/// Slow subscribers lag and lose the oldest events; the controller is never
/// held up.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<LinkEvent>,
}

impl BroadcastSink {
    /// Create a sink whose subscribers each buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: LinkEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }
}

impl SampleSink for BroadcastSink {
    fn record_sample(&mut self, event: &SampleEvent) {
        self.publish(LinkEvent::Sample(event.clone()));
    }

    fn record_report(&mut self, report: &BatchReport) {
        self.publish(LinkEvent::Report(report.clone()));
    }
}
