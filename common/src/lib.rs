//! Shared domain types for the trading engine core
//!
//! Everything that crosses the event bus lives here: the event model,
//! market data records, orders, trades, positions, and the status
//! snapshots the engine shell aggregates. All wire-visible records
//! round-trip losslessly through serde (enum variants as their
//! SCREAMING_SNAKE_CASE names, timestamps as ISO-8601 UTC).

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod events;
pub mod market;
pub mod order;
pub mod position;
pub mod status;
pub mod telemetry;

pub use config::{EngineConfig, LogFormat, RiskLimitsConfig};
pub use events::{
    Event, EventPayload, EventType, RiskCheckKind, RiskCheckReport, StrategySignal, SystemEvent,
    DEFAULT_PRIORITY, HEARTBEAT_PRIORITY,
};
pub use market::{BookLevel, MarketData, MarketDataPayload, MarketDataType};
pub use order::{Order, OrderSide, OrderStatus, OrderType, TimeInForce, Trade, FILL_EPSILON};
pub use position::Position;
pub use status::{
    BusMetricsSnapshot, EngineStats, LatencyStats, OrderStatistics, PnlSummary,
    PositionStatistics, RiskSummary, RuleStatus,
};
