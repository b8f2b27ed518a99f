//! Periodic risk sweep through a running engine

mod support;

use common::{
    EngineConfig, Event, EventPayload, EventType, OrderSide, RiskCheckKind, RiskLimitsConfig,
    Trade,
};
use engine::TradingEngine;
use support::{wait_until, EventRecorder};
use uuid::Uuid;

#[tokio::test]
async fn drawdown_breach_is_reported_by_periodic_sweep() {
    let engine = TradingEngine::new(EngineConfig {
        risk_limits: RiskLimitsConfig {
            max_drawdown_pct: Some(10.0),
            check_interval_seconds: 1,
            ..Default::default()
        },
        ..Default::default()
    });
    let recorder = EventRecorder::new("risk_recorder");
    engine.event_bus().add_handler(EventType::RiskCheck, recorder.clone());
    engine.start();

    // Build a profitable position so the sweep records a positive peak.
    let seed = Trade::new(Uuid::new_v4(), "X", OrderSide::Buy, 10.0, 100.0);
    engine
        .event_bus()
        .publish(Event::new(EventPayload::TradeUpdate(seed), "venue"));
    let positions = engine.position_manager().clone();
    wait_until(|| positions.get_position("X").quantity == 10.0).await;
    positions.update_position_price("X", 110.0);

    // Let at least one sweep observe the +100 peak.
    tokio::time::sleep(std::time::Duration::from_millis(1300)).await;

    // Give most of the gain back; drawdown is now far over 10%.
    positions.update_position_price("X", 95.0);

    wait_until(|| !recorder.risk_reports().is_empty()).await;
    let report = &recorder.risk_reports()[0];
    assert!(!report.passed);
    assert_eq!(report.check_type, Some(RiskCheckKind::Periodic));
    assert_eq!(report.order_id, None);
    assert!(report.messages.iter().any(|m| m.contains("drawdown")));

    engine.stop().await;
}

#[tokio::test]
async fn periodic_position_breach_is_reported() {
    let mut limits = rustc_hash::FxHashMap::default();
    limits.insert("X".to_string(), 5.0);
    let engine = TradingEngine::new(EngineConfig {
        risk_limits: RiskLimitsConfig {
            position_limits: limits,
            check_interval_seconds: 1,
            ..Default::default()
        },
        ..Default::default()
    });
    let recorder = EventRecorder::new("risk_recorder");
    engine.event_bus().add_handler(EventType::RiskCheck, recorder.clone());
    engine.start();

    // A fill that lands the book over its limit; only the periodic
    // sweep catches it because no order was gated.
    let oversized = Trade::new(Uuid::new_v4(), "X", OrderSide::Buy, 7.0, 100.0);
    engine
        .event_bus()
        .publish(Event::new(EventPayload::TradeUpdate(oversized), "venue"));

    wait_until(|| {
        recorder
            .risk_reports()
            .iter()
            .any(|report| report.check_type == Some(RiskCheckKind::Periodic))
    })
    .await;

    let reports = recorder.risk_reports();
    let report = reports
        .iter()
        .find(|report| report.check_type == Some(RiskCheckKind::Periodic))
        .unwrap();
    assert!(report.messages.iter().any(|m| m.contains("exceeds limit")));

    engine.stop().await;
}
