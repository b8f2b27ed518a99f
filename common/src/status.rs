//! Status and statistics snapshots
//!
//! Plain data records produced by the bus and the managers and
//! aggregated by the engine shell into heartbeat and status events.

use crate::events::EventType;
use crate::order::OrderStatus;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Handler latency over the bounded sample window of one event type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    /// Events in the window
    pub events: u64,
    /// Mean handler-set latency in milliseconds
    pub avg_ms: f64,
    /// Worst handler-set latency in milliseconds
    pub max_ms: f64,
}

/// Point-in-time view of the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMetricsSnapshot {
    /// Events currently queued
    pub queue_depth: usize,
    /// Events dropped on publish (queue full or throttled)
    pub dropped_events: u64,
    /// Events dropped for arriving behind their source's sequence
    pub out_of_sequence_events: u64,
    /// Events delivered to handlers
    pub events_dispatched: u64,
    /// Latency window per event type
    pub handler_latency: FxHashMap<EventType, LatencyStats>,
}

/// Order-table statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatistics {
    /// Orders currently active
    pub active_orders: usize,
    /// Orders known to the engine
    pub total_orders: usize,
    /// Count per status
    pub by_status: FxHashMap<OrderStatus, usize>,
}

/// Realized / unrealized P&L totals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PnlSummary {
    /// P&L locked in by closing trades
    pub realized_pnl: f64,
    /// Mark-to-market P&L of open positions
    pub unrealized_pnl: f64,
    /// Realized plus unrealized
    pub total_pnl: f64,
}

/// Position-table statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionStatistics {
    /// P&L totals
    #[serde(flatten)]
    pub pnl: PnlSummary,
    /// Instruments with a position record
    pub position_count: usize,
    /// Positions currently long
    pub long_positions: usize,
    /// Positions currently short
    pub short_positions: usize,
    /// Positions currently flat
    pub flat_positions: usize,
    /// Largest long position value
    pub largest_long_value: f64,
    /// Largest short position value (most negative)
    pub largest_short_value: f64,
    /// Position updates applied since start
    pub position_updates: u64,
}

/// State of one registered risk rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleStatus {
    /// Rule name
    pub name: String,
    /// Whether the rule participates in checks
    pub enabled: bool,
    /// Failures recorded by the rule
    pub violations: u64,
    /// When the rule last ran
    pub last_check: Option<DateTime<Utc>>,
}

/// Portfolio-level risk summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSummary {
    /// Sum of absolute position values
    pub gross_exposure: f64,
    /// Sum of signed position values
    pub net_exposure: f64,
    /// Value held long
    pub long_exposure: f64,
    /// Value held short (negative)
    pub short_exposure: f64,
    /// Long over absolute short; `None` when there is no short exposure
    pub long_short_ratio: Option<f64>,
    /// Standard deviation of per-position unrealized P&L
    pub pnl_volatility: f64,
    /// Violations recorded across all rules
    pub rule_violations: u64,
    /// Rules currently enabled
    pub active_rules: usize,
    /// When the summary was taken
    pub timestamp: DateTime<Utc>,
}

/// Engine-shell counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Events delivered by the bus
    pub events_processed: u64,
    /// Orders that entered the engine in `PendingNew`
    pub orders_submitted: u64,
    /// Trades applied
    pub trades_executed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_keys_serialize_as_names() {
        let mut latency = FxHashMap::default();
        latency.insert(
            EventType::MarketData,
            LatencyStats { events: 3, avg_ms: 0.5, max_ms: 1.25 },
        );
        let snapshot = BusMetricsSnapshot {
            queue_depth: 0,
            dropped_events: 2,
            out_of_sequence_events: 0,
            events_dispatched: 3,
            handler_latency: latency,
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"MARKET_DATA\""));

        let back: BusMetricsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.dropped_events, 2);
        assert_eq!(back.handler_latency.len(), 1);
    }

    #[test]
    fn position_statistics_flatten_pnl() {
        let stats = PositionStatistics {
            pnl: PnlSummary { realized_pnl: 1.0, unrealized_pnl: 2.0, total_pnl: 3.0 },
            position_count: 1,
            long_positions: 1,
            short_positions: 0,
            flat_positions: 0,
            largest_long_value: 100.0,
            largest_short_value: 0.0,
            position_updates: 4,
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["realized_pnl"], 1.0);
        assert_eq!(json["total_pnl"], 3.0);
    }
}
