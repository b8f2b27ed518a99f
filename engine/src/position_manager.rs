//! Position manager
//!
//! One position per instrument, created lazily. Trades are applied as
//! they execute; market data re-marks existing positions, with small
//! unrealized-P&L moves suppressed to keep POSITION_UPDATE traffic down.

use anyhow::Result;
use async_trait::async_trait;
use bus::{EventBus, EventHandler};
use chrono::Utc;
use common::{
    Event, EventPayload, MarketData, PnlSummary, Position, PositionStatistics, Trade,
};
use dashmap::DashMap;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

const SOURCE: &str = "position_manager";

/// Absolute unrealized-P&L change that always publishes.
const PNL_PUBLISH_ABS: f64 = 0.01;
/// Relative unrealized-P&L change that always publishes.
const PNL_PUBLISH_REL: f64 = 0.001;

/// The position manager.
pub struct PositionManager {
    bus: Arc<EventBus>,
    positions: DashMap<String, Position>,
    updates: AtomicU64,
}

impl PositionManager {
    /// Create a position manager publishing on the given bus.
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus, positions: DashMap::new(), updates: AtomicU64::new(0) }
    }

    /// Position for an instrument, created flat if absent.
    #[must_use]
    pub fn get_position(&self, instrument_id: &str) -> Position {
        self.positions
            .entry(instrument_id.to_string())
            .or_insert_with(|| Position::new(instrument_id))
            .clone()
    }

    /// Every known position.
    #[must_use]
    pub fn get_all_positions(&self) -> Vec<Position> {
        self.positions.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Instruments with a position record.
    #[must_use]
    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Total position value across all instruments.
    #[must_use]
    pub fn get_net_position(&self) -> f64 {
        self.positions.iter().map(|entry| entry.position_value).sum()
    }

    /// Realized / unrealized / total P&L across all positions.
    #[must_use]
    pub fn get_pnl_summary(&self) -> PnlSummary {
        let mut realized = 0.0;
        let mut unrealized = 0.0;
        for entry in self.positions.iter() {
            realized += entry.realized_pnl;
            unrealized += entry.unrealized_pnl;
        }
        PnlSummary {
            realized_pnl: realized,
            unrealized_pnl: unrealized,
            total_pnl: realized + unrealized,
        }
    }

    /// Re-mark one instrument at an externally supplied price and
    /// publish the update.
    pub fn update_position_price(&self, instrument_id: &str, price: f64) {
        let snapshot = {
            let mut position = self
                .positions
                .entry(instrument_id.to_string())
                .or_insert_with(|| Position::new(instrument_id));
            position.update_price(price);
            position.timestamp = Utc::now();
            position.clone()
        };
        self.publish_position(snapshot);
    }

    /// Record the quantity of an instrument allocated to a strategy and
    /// publish the update.
    pub fn add_strategy_allocation(&self, instrument_id: &str, strategy_id: &str, quantity: f64) {
        let snapshot = {
            let mut position = self
                .positions
                .entry(instrument_id.to_string())
                .or_insert_with(|| Position::new(instrument_id));
            position.strategy_allocations.insert(strategy_id.to_string(), quantity);
            position.clone()
        };
        self.publish_position(snapshot);
    }

    /// Allocated quantity per instrument for one strategy.
    #[must_use]
    pub fn get_strategy_exposure(&self, strategy_id: &str) -> FxHashMap<String, f64> {
        self.positions
            .iter()
            .filter_map(|entry| {
                entry
                    .strategy_allocations
                    .get(strategy_id)
                    .map(|quantity| (entry.key().clone(), *quantity))
            })
            .collect()
    }

    /// Position-table statistics.
    #[must_use]
    pub fn get_position_statistics(&self) -> PositionStatistics {
        let positions = self.get_all_positions();
        let long_positions = positions.iter().filter(|p| p.quantity > 0.0).count();
        let short_positions = positions.iter().filter(|p| p.quantity < 0.0).count();
        let flat_positions = positions.iter().filter(|p| p.quantity == 0.0).count();
        let largest_long_value = positions
            .iter()
            .filter(|p| p.quantity > 0.0)
            .map(|p| p.position_value)
            .fold(0.0f64, f64::max);
        let largest_short_value = positions
            .iter()
            .filter(|p| p.quantity < 0.0)
            .map(|p| p.position_value)
            .fold(0.0f64, f64::min);

        PositionStatistics {
            pnl: self.get_pnl_summary(),
            position_count: positions.len(),
            long_positions,
            short_positions,
            flat_positions,
            largest_long_value,
            largest_short_value,
            position_updates: self.updates.load(Ordering::Relaxed),
        }
    }

    /// Apply an executed trade. Trade-driven updates always publish.
    pub(crate) fn on_trade_update(&self, trade: &Trade) {
        let snapshot = {
            let mut position = self
                .positions
                .entry(trade.instrument_id.clone())
                .or_insert_with(|| Position::new(&trade.instrument_id));
            position.apply_trade(trade);
            position.timestamp = Utc::now();
            position.clone()
        };
        self.updates.fetch_add(1, Ordering::Relaxed);
        debug!(instrument_id = %snapshot.instrument_id, quantity = snapshot.quantity,
               avg_price = snapshot.average_entry_price,
               realized = snapshot.realized_pnl, "position updated from trade");
        self.publish_position(snapshot);
    }

    /// Re-mark an existing position from market data. Publishes only
    /// when the unrealized P&L moved enough to matter.
    pub(crate) fn on_market_data(&self, market_data: &MarketData) {
        let Some(price) = market_data.data.reference_price() else {
            return;
        };
        let Some(mut position) = self.positions.get_mut(&market_data.instrument_id) else {
            return;
        };

        let old_unrealized = position.unrealized_pnl;
        position.update_price(price);
        position.timestamp = Utc::now();

        let change = (position.unrealized_pnl - old_unrealized).abs();
        let significant =
            change > PNL_PUBLISH_ABS || change / old_unrealized.abs().max(0.01) > PNL_PUBLISH_REL;
        if !significant {
            return;
        }
        let snapshot = position.clone();
        drop(position);
        self.publish_position(snapshot);
    }

    fn publish_position(&self, position: Position) {
        self.bus.publish(Event::new(EventPayload::PositionUpdate(position), SOURCE));
    }
}

#[async_trait]
impl EventHandler for PositionManager {
    async fn handle(&self, event: &Event) -> Result<()> {
        match &event.payload {
            EventPayload::TradeUpdate(trade) => self.on_trade_update(trade),
            EventPayload::MarketData(market_data) => self.on_market_data(market_data),
            other => {
                error!(event_type = ?other.event_type(), "unexpected payload in position manager");
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        SOURCE
    }
}
