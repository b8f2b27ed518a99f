//! Order and trade definitions

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tolerance used when comparing filled quantity against ordered quantity.
pub const FILL_EPSILON: f64 = 1e-10;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    /// Buy order
    Buy,
    /// Sell order
    Sell,
}

impl OrderSide {
    /// Sign applied to a quantity on this side (+1 for buys, -1 for sells).
    #[must_use]
    pub const fn sign(&self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Market order
    Market,
    /// Limit order
    Limit,
    /// Stop order
    Stop,
    /// Stop limit order
    StopLimit,
    /// Trailing stop order
    TrailingStop,
    /// Iceberg order
    Iceberg,
    /// TWAP algorithm
    Twap,
    /// VWAP algorithm
    Vwap,
}

/// Time in force
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    /// Good till cancelled
    Gtc,
    /// Immediate or cancel
    Ioc,
    /// Fill or kill
    Fok,
    /// Good till date
    Gtd,
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created locally, not yet acknowledged
    PendingNew,
    /// Acknowledged by the venue
    New,
    /// Partially filled
    PartiallyFilled,
    /// Fully filled
    Filled,
    /// Cancel requested, not yet confirmed
    PendingCancel,
    /// Cancelled
    Cancelled,
    /// Rejected
    Rejected,
    /// Expired
    Expired,
}

impl OrderStatus {
    /// All statuses, in declaration order. Used for per-status breakdowns.
    pub const ALL: [Self; 8] = [
        Self::PendingNew,
        Self::New,
        Self::PartiallyFilled,
        Self::Filled,
        Self::PendingCancel,
        Self::Cancelled,
        Self::Rejected,
        Self::Expired,
    ];
}

/// Order record
///
/// An order is identified by `order_id` for its whole lifetime; every
/// state change is recorded by the order manager as an immutable
/// snapshot of this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Unique order ID
    pub order_id: Uuid,
    /// Instrument this order trades
    pub instrument_id: String,
    /// Order type
    pub order_type: OrderType,
    /// Order side
    pub side: OrderSide,
    /// Ordered quantity
    pub quantity: f64,
    /// Limit price (for limit orders)
    pub price: Option<f64>,
    /// Stop price (for stop orders)
    pub stop_price: Option<f64>,
    /// Time in force
    pub time_in_force: TimeInForce,
    /// Execution venue
    pub exchange: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
    /// Order status
    pub status: OrderStatus,
    /// Quantity filled so far
    pub filled_quantity: f64,
    /// Volume-weighted average fill price
    pub average_fill_price: Option<f64>,
    /// Client-assigned order ID
    pub client_order_id: Option<String>,
    /// Parent order ID for child orders
    pub parent_order_id: Option<Uuid>,
    /// Strategy that originated the order
    pub strategy_id: Option<String>,
    /// Free-form tags
    pub tags: FxHashMap<String, String>,
    /// Venue-specific execution instructions
    pub execution_instructions: FxHashMap<String, serde_json::Value>,
    /// Expiry for GTD orders
    pub expiry_date: Option<DateTime<Utc>>,
}

impl Order {
    /// Create a new order in `PendingNew` status.
    #[must_use]
    pub fn new(
        instrument_id: impl Into<String>,
        order_type: OrderType,
        side: OrderSide,
        quantity: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            order_id: Uuid::new_v4(),
            instrument_id: instrument_id.into(),
            order_type,
            side,
            quantity,
            price: None,
            stop_price: None,
            time_in_force: TimeInForce::Gtc,
            exchange: String::new(),
            created_at: now,
            updated_at: now,
            status: OrderStatus::PendingNew,
            filled_quantity: 0.0,
            average_fill_price: None,
            client_order_id: None,
            parent_order_id: None,
            strategy_id: None,
            tags: FxHashMap::default(),
            execution_instructions: FxHashMap::default(),
            expiry_date: None,
        }
    }

    /// Set the limit price.
    #[must_use]
    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    /// Set the stop price.
    #[must_use]
    pub fn with_stop_price(mut self, stop_price: f64) -> Self {
        self.stop_price = Some(stop_price);
        self
    }

    /// Set the time in force.
    #[must_use]
    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    /// Set the originating strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy_id: impl Into<String>) -> Self {
        self.strategy_id = Some(strategy_id.into());
        self
    }

    /// Set the execution venue.
    #[must_use]
    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    /// Quantity still open.
    #[must_use]
    pub fn remaining_quantity(&self) -> f64 {
        self.quantity - self.filled_quantity
    }

    /// Whether the order is live on the book (pending, acknowledged, or
    /// partially filled).
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::PendingNew | OrderStatus::New | OrderStatus::PartiallyFilled
        )
    }

    /// Whether the order has reached a terminal status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }
}

/// Trade (fill) record. Immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Unique trade ID
    pub trade_id: Uuid,
    /// Order this trade executed against
    pub order_id: Uuid,
    /// Instrument traded
    pub instrument_id: String,
    /// Executed quantity, always positive
    pub quantity: f64,
    /// Execution price, always positive
    pub price: f64,
    /// Side of the executed order
    pub side: OrderSide,
    /// Execution timestamp
    pub timestamp: DateTime<Utc>,
    /// Execution venue
    pub exchange: String,
    /// Commission charged
    pub commission: f64,
    /// Commission currency
    pub commission_currency: String,
}

impl Trade {
    /// Create a trade for an order.
    #[must_use]
    pub fn new(
        order_id: Uuid,
        instrument_id: impl Into<String>,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> Self {
        Self {
            trade_id: Uuid::new_v4(),
            order_id,
            instrument_id: instrument_id.into(),
            quantity,
            price,
            side,
            timestamp: Utc::now(),
            exchange: String::new(),
            commission: 0.0,
            commission_currency: "USD".to_string(),
        }
    }

    /// Quantity with the side's sign applied (buys positive, sells negative).
    #[must_use]
    pub fn signed_quantity(&self) -> f64 {
        self.side.sign() * self.quantity
    }
}
