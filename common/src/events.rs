//! The event model
//!
//! Everything that moves between components is an [`Event`]: a typed
//! payload plus routing metadata (source, optional target, optional
//! per-source sequence number, priority). The payload is a tagged sum,
//! so a handler registered for an event type always receives the
//! matching record.

use crate::market::MarketData;
use crate::order::{Order, OrderSide, Trade};
use crate::position::Position;
use crate::status::{
    BusMetricsSnapshot, EngineStats, OrderStatistics, PositionStatistics, RiskSummary,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default priority for ordinary events. Lower values dispatch earlier.
pub const DEFAULT_PRIORITY: u8 = 1;

/// Priority used for heartbeats, behind ordinary traffic.
pub const HEARTBEAT_PRIORITY: u8 = 3;

/// Event type, the key handlers register under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Market data from a feed
    MarketData,
    /// Order state change
    OrderUpdate,
    /// Executed trade
    TradeUpdate,
    /// Position change
    PositionUpdate,
    /// Signal emitted by a strategy
    StrategySignal,
    /// Risk check outcome
    RiskCheck,
    /// Engine lifecycle and control
    SystemEvent,
}

/// Typed event payload, one case per [`EventType`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    /// Market data record
    MarketData(MarketData),
    /// Order snapshot
    OrderUpdate(Order),
    /// Trade record
    TradeUpdate(Trade),
    /// Position snapshot
    PositionUpdate(Position),
    /// Strategy signal
    StrategySignal(StrategySignal),
    /// Risk check report
    RiskCheck(RiskCheckReport),
    /// System event
    SystemEvent(SystemEvent),
}

impl EventPayload {
    /// The event type this payload dispatches under.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::MarketData(_) => EventType::MarketData,
            Self::OrderUpdate(_) => EventType::OrderUpdate,
            Self::TradeUpdate(_) => EventType::TradeUpdate,
            Self::PositionUpdate(_) => EventType::PositionUpdate,
            Self::StrategySignal(_) => EventType::StrategySignal,
            Self::RiskCheck(_) => EventType::RiskCheck,
            Self::SystemEvent(_) => EventType::SystemEvent,
        }
    }
}

/// An event on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Typed payload, tagged by `event_type`
    #[serde(flatten)]
    pub payload: EventPayload,
    /// When the event was created
    pub timestamp: DateTime<Utc>,
    /// Producer identifier
    pub source: String,
    /// Optional addressee
    pub target: Option<String>,
    /// Per-source monotonic sequence number
    pub sequence_id: Option<u64>,
    /// Dispatch priority; smaller dispatches earlier
    pub priority: u8,
}

impl Event {
    /// Create an event with default priority, stamped with the current time.
    #[must_use]
    pub fn new(payload: EventPayload, source: impl Into<String>) -> Self {
        Self {
            payload,
            timestamp: Utc::now(),
            source: source.into(),
            target: None,
            sequence_id: None,
            priority: DEFAULT_PRIORITY,
        }
    }

    /// Set the dispatch priority.
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Attach a per-source sequence number.
    #[must_use]
    pub fn with_sequence(mut self, sequence_id: u64) -> Self {
        self.sequence_id = Some(sequence_id);
        self
    }

    /// Address the event to a specific consumer.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// The event type of the payload.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}

/// Signal emitted by a strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySignal {
    /// Strategy that produced the signal
    pub strategy_id: String,
    /// Instrument the signal refers to
    pub instrument_id: String,
    /// Suggested direction
    pub side: OrderSide,
    /// Signal strength in [0, 1]
    pub strength: f64,
    /// When the signal was produced
    pub timestamp: DateTime<Utc>,
}

/// Which path triggered a risk check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskCheckKind {
    /// Pre-trade gating of a new order
    Order,
    /// Periodic portfolio sweep
    Periodic,
}

/// Outcome of a risk rule evaluation round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskCheckReport {
    /// Whether every enabled rule passed
    pub passed: bool,
    /// Order being gated, for pre-trade checks
    pub order_id: Option<Uuid>,
    /// One message per failed rule
    pub messages: Vec<String>,
    /// When the check ran
    pub timestamp: DateTime<Utc>,
    /// Which path triggered the check
    pub check_type: Option<RiskCheckKind>,
}

/// Engine lifecycle and control events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemEvent {
    /// Engine started
    Startup {
        /// Engine name
        engine_name: String,
        /// Instance identifier
        instance_id: String,
        /// Startup time
        timestamp: DateTime<Utc>,
    },
    /// Engine stopped
    Shutdown {
        /// Engine name
        engine_name: String,
        /// Instance identifier
        instance_id: String,
        /// Shutdown time
        timestamp: DateTime<Utc>,
        /// Seconds the engine was up
        uptime_seconds: f64,
        /// Final counters
        stats: EngineStats,
    },
    /// Periodic liveness beacon
    Heartbeat {
        /// Engine name
        engine_name: String,
        /// Instance identifier
        instance_id: String,
        /// Heartbeat time
        timestamp: DateTime<Utc>,
        /// Seconds the engine has been up
        uptime_seconds: f64,
        /// Events currently queued on the bus
        event_queue_size: usize,
        /// Orders currently active
        active_orders: usize,
        /// Instruments with a position record
        positions_count: usize,
    },
    /// Full status report
    Status {
        /// Engine name
        engine_name: String,
        /// Instance identifier
        instance_id: String,
        /// Report time
        timestamp: DateTime<Utc>,
        /// Seconds the engine has been up
        uptime_seconds: f64,
        /// Bus metrics
        performance: BusMetricsSnapshot,
        /// Order-table statistics
        orders: OrderStatistics,
        /// Position-table statistics
        positions: PositionStatistics,
        /// Risk summary
        risk: RiskSummary,
        /// Engine counters
        stats: EngineStats,
    },
    /// Ask the engine to emit a heartbeat
    HeartbeatRequest,
    /// Ask the engine to emit a status report
    StatusRequest,
    /// A market data source was registered
    DataSourceRegistered {
        /// Source identifier
        source_id: String,
        /// Registration time
        timestamp: DateTime<Utc>,
    },
    /// A strategy was registered
    StrategyRegistered {
        /// Strategy identifier
        strategy_id: String,
        /// Opaque strategy descriptor
        strategy_info: serde_json::Value,
        /// Registration time
        timestamp: DateTime<Utc>,
    },
}
