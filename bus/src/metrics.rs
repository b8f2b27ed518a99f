//! Bus metrics collection

use common::{BusMetricsSnapshot, EventType, LatencyStats};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Samples kept per event type. Older samples roll off.
const LATENCY_WINDOW: usize = 1000;

/// Counters and latency windows maintained by the bus.
pub struct BusMetrics {
    dropped: AtomicU64,
    out_of_sequence: AtomicU64,
    dispatched: AtomicU64,
    latencies: Mutex<FxHashMap<EventType, VecDeque<Duration>>>,
}

impl BusMetrics {
    /// Create a zeroed collector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dropped: AtomicU64::new(0),
            out_of_sequence: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            latencies: Mutex::new(FxHashMap::default()),
        }
    }

    /// Count a publish-side drop (queue full or throttled).
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a behind-sequence drop.
    pub fn record_out_of_sequence(&self) {
        self.out_of_sequence.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one dispatched event and its whole-handler-set latency.
    pub fn record_dispatch(&self, event_type: EventType, elapsed: Duration) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        let mut latencies = self.latencies.lock();
        let window = latencies.entry(event_type).or_default();
        if window.len() == LATENCY_WINDOW {
            window.pop_front();
        }
        window.push_back(elapsed);
    }

    /// Take a snapshot, attaching the current queue depth.
    #[must_use]
    pub fn snapshot(&self, queue_depth: usize) -> BusMetricsSnapshot {
        let handler_latency = self
            .latencies
            .lock()
            .iter()
            .map(|(event_type, window)| {
                let events = window.len() as u64;
                let total_ms: f64 = window.iter().map(Duration::as_secs_f64).sum::<f64>() * 1000.0;
                let max_ms = window
                    .iter()
                    .map(|d| d.as_secs_f64() * 1000.0)
                    .fold(0.0f64, f64::max);
                let avg_ms = if events == 0 { 0.0 } else { total_ms / events as f64 };
                (*event_type, LatencyStats { events, avg_ms, max_ms })
            })
            .collect();

        BusMetricsSnapshot {
            queue_depth,
            dropped_events: self.dropped.load(Ordering::Relaxed),
            out_of_sequence_events: self.out_of_sequence.load(Ordering::Relaxed),
            events_dispatched: self.dispatched.load(Ordering::Relaxed),
            handler_latency,
        }
    }
}

impl Default for BusMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_window_is_bounded() {
        let metrics = BusMetrics::new();
        for _ in 0..(LATENCY_WINDOW + 10) {
            metrics.record_dispatch(EventType::MarketData, Duration::from_micros(50));
        }
        let snapshot = metrics.snapshot(0);
        let stats = snapshot.handler_latency.get(&EventType::MarketData).unwrap();
        assert_eq!(stats.events, LATENCY_WINDOW as u64);
        assert_eq!(snapshot.events_dispatched, (LATENCY_WINDOW + 10) as u64);
    }

    #[test]
    fn snapshot_reports_counters() {
        let metrics = BusMetrics::new();
        metrics.record_dropped();
        metrics.record_dropped();
        metrics.record_out_of_sequence();
        let snapshot = metrics.snapshot(7);
        assert_eq!(snapshot.queue_depth, 7);
        assert_eq!(snapshot.dropped_events, 2);
        assert_eq!(snapshot.out_of_sequence_events, 1);
    }

    #[test]
    fn average_and_max_latency() {
        let metrics = BusMetrics::new();
        metrics.record_dispatch(EventType::OrderUpdate, Duration::from_millis(1));
        metrics.record_dispatch(EventType::OrderUpdate, Duration::from_millis(3));
        let snapshot = metrics.snapshot(0);
        let stats = snapshot.handler_latency.get(&EventType::OrderUpdate).unwrap();
        assert!((stats.avg_ms - 2.0).abs() < 0.5);
        assert!(stats.max_ms >= 3.0);
    }
}
