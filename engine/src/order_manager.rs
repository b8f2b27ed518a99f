//! Order manager
//!
//! Owns the order table, the active-order index, the append-only
//! history trail, and per-order trades and callbacks. All state
//! changes flow through ORDER_UPDATE and TRADE_UPDATE events; public
//! operations publish requests rather than mutating other components.

use anyhow::Result;
use async_trait::async_trait;
use bus::{EventBus, EventHandler};
use chrono::Utc;
use common::{
    Event, EventPayload, Order, OrderStatistics, OrderStatus, Trade, FILL_EPSILON,
};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

const SOURCE: &str = "order_manager";

/// Per-order callback invoked on every state change of that order.
///
/// Errors are logged and isolated; they never affect order state or
/// other callbacks.
#[async_trait]
pub trait OrderCallback: Send + Sync {
    /// Called with the latest order snapshot.
    async fn on_update(&self, order: &Order) -> Result<()>;
}

#[derive(Default)]
struct OrderStore {
    orders: FxHashMap<Uuid, Order>,
    active: FxHashSet<Uuid>,
    history: FxHashMap<Uuid, Vec<Order>>,
    trades: FxHashMap<Uuid, Vec<Trade>>,
}

impl OrderStore {
    /// Store an order snapshot, maintain the active index, and append
    /// to the order's history.
    fn upsert(&mut self, order: Order) {
        if order.is_active() {
            self.active.insert(order.order_id);
        } else {
            self.active.remove(&order.order_id);
        }
        self.history.entry(order.order_id).or_default().push(order.clone());
        self.orders.insert(order.order_id, order);
    }
}

/// The order manager.
pub struct OrderManager {
    bus: Arc<EventBus>,
    store: RwLock<OrderStore>,
    callbacks: RwLock<FxHashMap<Uuid, Arc<dyn OrderCallback>>>,
}

impl OrderManager {
    /// Create an order manager publishing on the given bus.
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            store: RwLock::new(OrderStore::default()),
            callbacks: RwLock::new(FxHashMap::default()),
        }
    }

    /// Submit an order.
    ///
    /// The order is forced into `PendingNew`, timestamped, stored, and
    /// announced with an ORDER_UPDATE. The optional callback fires on
    /// every subsequent update of this order.
    pub fn submit_order(
        &self,
        mut order: Order,
        callback: Option<Arc<dyn OrderCallback>>,
    ) -> Uuid {
        order.status = OrderStatus::PendingNew;
        order.created_at = Utc::now();
        order.updated_at = order.created_at;
        let order_id = order.order_id;

        self.store.write().upsert(order.clone());
        if let Some(callback) = callback {
            self.callbacks.write().insert(order_id, callback);
        }

        info!(%order_id, instrument_id = %order.instrument_id, side = ?order.side,
              quantity = order.quantity, "order submitted");
        self.publish_order(order);
        order_id
    }

    /// Request cancellation of an active order.
    ///
    /// Succeeds only for known orders in `New` or `PartiallyFilled`;
    /// the order moves to `PendingCancel` and an ORDER_UPDATE is
    /// published. Returns `false` without mutating anything otherwise.
    pub fn cancel_order(&self, order_id: &Uuid) -> bool {
        let updated = {
            let mut store = self.store.write();
            if !store.orders.contains_key(order_id) || !store.active.contains(order_id) {
                warn!(%order_id, "cancel for unknown or inactive order");
                return false;
            }
            let order = &store.orders[order_id];
            if !matches!(order.status, OrderStatus::New | OrderStatus::PartiallyFilled) {
                warn!(%order_id, status = ?order.status, "order not cancellable");
                return false;
            }
            let mut updated = order.clone();
            updated.status = OrderStatus::PendingCancel;
            updated.updated_at = Utc::now();
            store.upsert(updated.clone());
            updated
        };

        self.publish_order(updated);
        true
    }

    /// Request a price and/or quantity change on an active order.
    ///
    /// Same precondition as cancel; additionally, a partially filled
    /// order's quantity cannot drop below its filled quantity. The
    /// modified order keeps its `order_id` and flows through the normal
    /// update path.
    pub fn modify_order(
        &self,
        order_id: &Uuid,
        price: Option<f64>,
        quantity: Option<f64>,
    ) -> bool {
        let updated = {
            let mut store = self.store.write();
            if !store.orders.contains_key(order_id) || !store.active.contains(order_id) {
                warn!(%order_id, "modify for unknown or inactive order");
                return false;
            }
            let order = &store.orders[order_id];
            if !matches!(order.status, OrderStatus::New | OrderStatus::PartiallyFilled) {
                warn!(%order_id, status = ?order.status, "order not modifiable");
                return false;
            }

            let mut updated = order.clone();
            if let Some(price) = price {
                updated.price = Some(price);
            }
            if let Some(quantity) = quantity {
                if order.status == OrderStatus::PartiallyFilled
                    && quantity < order.filled_quantity
                {
                    warn!(%order_id, quantity, filled = order.filled_quantity,
                          "cannot reduce quantity below filled amount");
                    return false;
                }
                updated.quantity = quantity;
            }
            updated.updated_at = Utc::now();
            store.upsert(updated.clone());
            updated
        };

        self.publish_order(updated);
        true
    }

    /// Cancel a batch of orders, reporting the outcome per order.
    pub fn batch_cancel_orders(&self, order_ids: &[Uuid]) -> FxHashMap<Uuid, bool> {
        order_ids.iter().map(|id| (*id, self.cancel_order(id))).collect()
    }

    /// Cancel every active order matching the filters. Returns how many
    /// cancel requests were accepted.
    pub fn cancel_all_orders(
        &self,
        strategy_id: Option<&str>,
        instrument_id: Option<&str>,
    ) -> usize {
        let order_ids: Vec<Uuid> = self
            .get_active_orders(strategy_id, instrument_id)
            .into_iter()
            .map(|order| order.order_id)
            .collect();
        self.batch_cancel_orders(&order_ids)
            .values()
            .filter(|accepted| **accepted)
            .count()
    }

    /// Current state of an order.
    #[must_use]
    pub fn get_order(&self, order_id: &Uuid) -> Option<Order> {
        self.store.read().orders.get(order_id).cloned()
    }

    /// Every recorded snapshot of an order, oldest first.
    #[must_use]
    pub fn get_order_history(&self, order_id: &Uuid) -> Vec<Order> {
        self.store.read().history.get(order_id).cloned().unwrap_or_default()
    }

    /// Trades recorded against an order.
    #[must_use]
    pub fn get_trades(&self, order_id: &Uuid) -> Vec<Trade> {
        self.store.read().trades.get(order_id).cloned().unwrap_or_default()
    }

    /// Active orders, optionally filtered by strategy and instrument.
    #[must_use]
    pub fn get_active_orders(
        &self,
        strategy_id: Option<&str>,
        instrument_id: Option<&str>,
    ) -> Vec<Order> {
        let store = self.store.read();
        store
            .active
            .iter()
            .filter_map(|id| store.orders.get(id))
            .filter(|order| {
                strategy_id.is_none_or(|s| order.strategy_id.as_deref() == Some(s))
            })
            .filter(|order| instrument_id.is_none_or(|i| order.instrument_id == i))
            .cloned()
            .collect()
    }

    /// Orders currently active.
    #[must_use]
    pub fn active_order_count(&self) -> usize {
        self.store.read().active.len()
    }

    /// Order-table statistics with a per-status breakdown.
    #[must_use]
    pub fn get_order_statistics(&self) -> OrderStatistics {
        let store = self.store.read();
        let mut by_status: FxHashMap<OrderStatus, usize> =
            OrderStatus::ALL.iter().map(|status| (*status, 0)).collect();
        for order in store.orders.values() {
            *by_status.entry(order.status).or_insert(0) += 1;
        }
        OrderStatistics {
            active_orders: store.active.len(),
            total_orders: store.orders.len(),
            by_status,
        }
    }

    async fn on_order_update(&self, order: &Order) -> Result<()> {
        self.store.write().upsert(order.clone());

        let callback = self.callbacks.read().get(&order.order_id).cloned();
        if let Some(callback) = callback {
            if let Err(error) = callback.on_update(order).await {
                error!(order_id = %order.order_id, %error, "order callback failed");
            }
        }
        Ok(())
    }

    /// Apply a trade to its parent order: accumulate the fill, update
    /// the volume-weighted average fill price, advance the status, and
    /// republish the order.
    fn on_trade_update(&self, trade: &Trade) {
        let updated = {
            let mut guard = self.store.write();
            let store = &mut *guard;
            store.trades.entry(trade.order_id).or_default().push(trade.clone());

            let Some(order) = store.orders.get_mut(&trade.order_id) else {
                return;
            };

            order.filled_quantity += trade.quantity;
            let prev_filled = order.filled_quantity - trade.quantity;
            order.average_fill_price = Some(match order.average_fill_price {
                None => trade.price,
                Some(avg) => {
                    (avg * prev_filled + trade.price * trade.quantity) / order.filled_quantity
                }
            });

            if (order.filled_quantity - order.quantity).abs() < FILL_EPSILON {
                order.status = OrderStatus::Filled;
                store.active.remove(&trade.order_id);
            } else if order.filled_quantity > 0.0 {
                order.status = OrderStatus::PartiallyFilled;
            }
            order.updated_at = Utc::now();

            let snapshot = order.clone();
            store.history.entry(trade.order_id).or_default().push(snapshot.clone());
            snapshot
        };

        self.publish_order(updated);
    }

    fn publish_order(&self, order: Order) {
        self.bus.publish(Event::new(EventPayload::OrderUpdate(order), SOURCE));
    }
}

#[async_trait]
impl EventHandler for OrderManager {
    async fn handle(&self, event: &Event) -> Result<()> {
        match &event.payload {
            EventPayload::OrderUpdate(order) => self.on_order_update(order).await,
            EventPayload::TradeUpdate(trade) => {
                self.on_trade_update(trade);
                Ok(())
            }
            other => {
                error!(event_type = ?other.event_type(), "unexpected payload in order manager");
                Ok(())
            }
        }
    }

    fn name(&self) -> &str {
        SOURCE
    }
}
