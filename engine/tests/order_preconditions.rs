//! Cancel/modify precondition matrix for the order manager

use bus::{EventBus, EventHandler};
use common::{Order, OrderSide, OrderStatus, OrderType, Trade};
use engine::OrderManager;
use rstest::*;
use std::sync::Arc;
use uuid::Uuid;

#[fixture]
fn manager() -> OrderManager {
    OrderManager::new(Arc::new(EventBus::new(1000)))
}

/// Submit an order and force it into the given status through the
/// normal update path, the way venue acknowledgements arrive.
async fn order_in_status(manager: &OrderManager, status: OrderStatus) -> Uuid {
    let order = Order::new("BTC-USD", OrderType::Limit, OrderSide::Buy, 10.0).with_price(100.0);
    let order_id = manager.submit_order(order, None);
    if status == OrderStatus::PendingNew {
        return order_id;
    }
    if status == OrderStatus::PartiallyFilled {
        // A partial fill drives the status transition itself.
        let mut acked = manager.get_order(&order_id).unwrap();
        acked.status = OrderStatus::New;
        publish_snapshot(manager, acked).await;
        let trade = Trade::new(order_id, "BTC-USD", OrderSide::Buy, 4.0, 100.0);
        manager
            .handle(&common::Event::new(common::EventPayload::TradeUpdate(trade), "venue"))
            .await
            .unwrap();
        return order_id;
    }
    let mut snapshot = manager.get_order(&order_id).unwrap();
    snapshot.status = status;
    publish_snapshot(manager, snapshot).await;
    order_id
}

async fn publish_snapshot(manager: &OrderManager, order: Order) {
    manager
        .handle(&common::Event::new(common::EventPayload::OrderUpdate(order), "venue"))
        .await
        .unwrap();
}

#[rstest]
#[case::pending_new(OrderStatus::PendingNew, false)]
#[case::acknowledged(OrderStatus::New, true)]
#[case::partially_filled(OrderStatus::PartiallyFilled, true)]
#[case::pending_cancel(OrderStatus::PendingCancel, false)]
#[case::filled(OrderStatus::Filled, false)]
#[case::cancelled(OrderStatus::Cancelled, false)]
#[case::rejected(OrderStatus::Rejected, false)]
#[case::expired(OrderStatus::Expired, false)]
#[tokio::test]
async fn cancel_is_allowed_only_when_working(
    manager: OrderManager,
    #[case] status: OrderStatus,
    #[case] expected: bool,
) {
    let order_id = order_in_status(&manager, status).await;
    assert_eq!(manager.cancel_order(&order_id), expected);
    if !expected {
        // Failed cancels never mutate the order.
        assert_eq!(manager.get_order(&order_id).unwrap().status, status);
    }
}

#[rstest]
#[case::acknowledged(OrderStatus::New, true)]
#[case::partially_filled(OrderStatus::PartiallyFilled, true)]
#[case::filled(OrderStatus::Filled, false)]
#[case::pending_new(OrderStatus::PendingNew, false)]
#[tokio::test]
async fn modify_price_follows_cancel_preconditions(
    manager: OrderManager,
    #[case] status: OrderStatus,
    #[case] expected: bool,
) {
    let order_id = order_in_status(&manager, status).await;
    assert_eq!(manager.modify_order(&order_id, Some(101.0), None), expected);
}
