//! Position record and its P&L arithmetic

use crate::order::{Trade, FILL_EPSILON};
use chrono::{DateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Net position in one instrument.
///
/// `quantity` is signed: positive long, negative short, zero flat. A
/// flat position always has zero unrealized P&L, zero value, and a zero
/// average entry price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Instrument this position is in
    pub instrument_id: String,
    /// Signed net quantity
    pub quantity: f64,
    /// Average entry price of the open quantity; 0 when flat
    pub average_entry_price: f64,
    /// Last reference price seen
    pub current_price: Option<f64>,
    /// P&L locked in by closing trades
    pub realized_pnl: f64,
    /// Mark-to-market P&L of the open quantity
    pub unrealized_pnl: f64,
    /// `quantity * current_price`
    pub position_value: f64,
    /// Last update timestamp
    pub timestamp: DateTime<Utc>,
    /// Orders currently open against this instrument
    pub open_orders: FxHashSet<Uuid>,
    /// Quantity allocated per strategy
    pub strategy_allocations: FxHashMap<String, f64>,
    /// Venue the position is held at
    pub exchange: Option<String>,
}

impl Position {
    /// Create a flat position for an instrument.
    #[must_use]
    pub fn new(instrument_id: impl Into<String>) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            quantity: 0.0,
            average_entry_price: 0.0,
            current_price: None,
            realized_pnl: 0.0,
            unrealized_pnl: 0.0,
            position_value: 0.0,
            timestamp: Utc::now(),
            open_orders: FxHashSet::default(),
            strategy_allocations: FxHashMap::default(),
            exchange: None,
        }
    }

    /// Whether the position is flat.
    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.quantity == 0.0
    }

    /// Realized plus unrealized P&L.
    #[must_use]
    pub fn total_pnl(&self) -> f64 {
        self.realized_pnl + self.unrealized_pnl
    }

    /// Re-mark the position at a fresh reference price.
    ///
    /// Never touches `realized_pnl` or `quantity`. The unrealized
    /// formula `quantity * (price - average_entry_price)` holds for
    /// both directions because `quantity` carries its sign.
    pub fn update_price(&mut self, price: f64) {
        self.current_price = Some(price);
        if self.quantity == 0.0 {
            self.unrealized_pnl = 0.0;
            self.position_value = 0.0;
            return;
        }
        self.position_value = self.quantity * price;
        self.unrealized_pnl = self.quantity * (price - self.average_entry_price);
    }

    /// Apply an executed trade to the position.
    ///
    /// Reducing trades realize P&L on the closed quantity at the
    /// standing average entry price; trades through zero realize the
    /// whole old position and open the residual at the trade price;
    /// same-direction trades re-weight the average entry price. The
    /// position is re-marked at the trade price afterwards.
    pub fn apply_trade(&mut self, trade: &Trade) {
        let signed_qty = trade.signed_quantity();
        let old_qty = self.quantity;
        let new_qty = old_qty + signed_qty;

        if old_qty * signed_qty < 0.0 {
            if signed_qty.abs() > old_qty.abs() {
                // Trade crosses zero: realize the whole old position,
                // the residual becomes a fresh position at the trade price.
                self.realized_pnl += if old_qty > 0.0 {
                    old_qty * (trade.price - self.average_entry_price)
                } else {
                    old_qty.abs() * (self.average_entry_price - trade.price)
                };
                let residual = signed_qty.abs() - old_qty.abs();
                self.quantity = if signed_qty > 0.0 { residual } else { -residual };
                self.average_entry_price = trade.price;
                self.update_price(trade.price);
                return;
            }

            // Partial or exact close: realize on the closed quantity,
            // average entry price of the remainder is unchanged.
            let closing = signed_qty.abs();
            self.realized_pnl += if old_qty > 0.0 {
                closing * (trade.price - self.average_entry_price)
            } else {
                closing * (self.average_entry_price - trade.price)
            };
            if new_qty.abs() < FILL_EPSILON {
                self.quantity = 0.0;
                self.average_entry_price = 0.0;
            } else {
                self.quantity = new_qty;
            }
        } else {
            // Same direction, or opening from flat: re-weight the average.
            let old_cost = old_qty.abs() * self.average_entry_price;
            let new_cost = old_cost + signed_qty.abs() * trade.price;
            self.quantity = new_qty;
            self.average_entry_price = new_cost / new_qty.abs();
        }

        self.update_price(trade.price);
    }
}
