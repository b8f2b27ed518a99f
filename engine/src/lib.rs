//! Event-driven trading engine core
//!
//! The [`TradingEngine`] owns the event bus and the three managers
//! (orders, positions, risk) and drives their lifecycle: the dispatch
//! loop, the periodic risk sweep, and the heartbeat. The bus is the
//! only coupling between components; the engine shell itself reacts to
//! SYSTEM_EVENT traffic (shutdown, heartbeat and status requests) and
//! keeps top-level counters.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod order_manager;
pub mod position_manager;
pub mod risk;
pub mod rules;

pub use order_manager::{OrderCallback, OrderManager};
pub use position_manager::PositionManager;
pub use risk::RiskManager;
pub use rules::{
    DrawdownLimitRule, ExposureByStrategyRule, PositionLimitRule, RiskContext, RiskRule,
    RuleState, RuleVerdict,
};

use anyhow::Result;
use async_trait::async_trait;
use bus::{EventBus, EventHandler};
use chrono::{DateTime, Utc};
use common::{
    BusMetricsSnapshot, EngineConfig, EngineStats, Event, EventPayload, EventType, MarketData,
    Order, OrderStatistics, Position, PositionStatistics, RiskSummary, RuleStatus, SystemEvent,
    HEARTBEAT_PRIORITY,
};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

const SOURCE: &str = "trading_engine";

/// A strategy known to the engine.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyRegistration {
    /// Opaque strategy descriptor supplied at registration
    pub info: serde_json::Value,
    /// When the strategy was registered
    pub registered_at: DateTime<Utc>,
}

/// Aggregated view of the whole engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// Engine name
    pub engine_name: String,
    /// Instance identifier
    pub instance_id: String,
    /// Whether the engine is running
    pub running: bool,
    /// When the engine started
    pub startup_time: Option<DateTime<Utc>>,
    /// When the engine stopped, if it has
    pub shutdown_time: Option<DateTime<Utc>>,
    /// When the status was taken
    pub current_time: DateTime<Utc>,
    /// Seconds since startup
    pub uptime_seconds: f64,
    /// When the last heartbeat went out
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Order-table statistics
    pub orders: OrderStatistics,
    /// Position-table statistics
    pub positions: PositionStatistics,
    /// Per-rule risk status
    pub risk_rules: Vec<RuleStatus>,
    /// Portfolio risk summary
    pub risk_summary: RiskSummary,
    /// Bus metrics
    pub event_bus: BusMetricsSnapshot,
    /// Engine counters
    pub stats: EngineStats,
    /// Registered market data sources
    pub data_sources: Vec<String>,
    /// Registered strategies
    pub strategies: FxHashMap<String, StrategyRegistration>,
}

#[derive(Default)]
struct EngineState {
    running: bool,
    startup_time: Option<DateTime<Utc>>,
    shutdown_time: Option<DateTime<Utc>>,
    last_heartbeat: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct EngineCounters {
    orders_submitted: AtomicU64,
    trades_executed: AtomicU64,
}

struct EngineInner {
    config: EngineConfig,
    bus: Arc<EventBus>,
    order_manager: Arc<OrderManager>,
    position_manager: Arc<PositionManager>,
    risk_manager: Arc<RiskManager>,
    state: RwLock<EngineState>,
    counters: EngineCounters,
    data_sources: RwLock<BTreeSet<String>>,
    strategies: RwLock<FxHashMap<String, StrategyRegistration>>,
    bus_task: Mutex<Option<JoinHandle<()>>>,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
}

/// The engine shell. Cheap to clone; all state lives behind an `Arc`.
#[derive(Clone)]
pub struct TradingEngine {
    inner: Arc<EngineInner>,
}

impl TradingEngine {
    /// Build an engine from configuration and wire every component to
    /// the bus. Handler registration order matters: the order manager
    /// sees updates first, then the position manager, then the risk
    /// gate, then the shell's own bookkeeping.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let bus = Arc::new(EventBus::new(config.event_queue_size));
        let order_manager = Arc::new(OrderManager::new(bus.clone()));
        let position_manager = Arc::new(PositionManager::new(bus.clone()));
        let risk_manager = Arc::new(RiskManager::new(
            bus.clone(),
            order_manager.clone(),
            position_manager.clone(),
            &config.risk_limits,
        ));

        bus.add_handler(EventType::OrderUpdate, order_manager.clone());
        bus.add_handler(EventType::TradeUpdate, order_manager.clone());
        bus.add_handler(EventType::TradeUpdate, position_manager.clone());
        bus.add_handler(EventType::MarketData, position_manager.clone());
        bus.add_handler(EventType::OrderUpdate, risk_manager.clone());

        let engine = Self {
            inner: Arc::new(EngineInner {
                config,
                bus: bus.clone(),
                order_manager,
                position_manager,
                risk_manager,
                state: RwLock::new(EngineState::default()),
                counters: EngineCounters::default(),
                data_sources: RwLock::new(BTreeSet::new()),
                strategies: RwLock::new(FxHashMap::default()),
                bus_task: Mutex::new(None),
                heartbeat_task: Mutex::new(None),
            }),
        };

        bus.add_handler(EventType::SystemEvent, Arc::new(engine.clone()));
        bus.add_handler(EventType::OrderUpdate, Arc::new(engine.clone()));
        bus.add_handler(EventType::TradeUpdate, Arc::new(engine.clone()));

        info!(engine_name = %engine.inner.config.engine_name,
              instance_id = %engine.inner.config.instance_id, "trading engine initialized");
        engine
    }

    /// Start the dispatch loop, the risk sweep, and the heartbeat, and
    /// announce startup. A second call warns and does nothing.
    pub fn start(&self) {
        let startup_time = {
            let mut state = self.inner.state.write();
            if state.running {
                warn!("trading engine already running");
                return;
            }
            state.running = true;
            let now = Utc::now();
            state.startup_time = Some(now);
            now
        };

        info!(engine_name = %self.inner.config.engine_name, "starting trading engine");

        let bus = self.inner.bus.clone();
        *self.inner.bus_task.lock() = Some(tokio::spawn(async move { bus.run().await }));

        self.inner.risk_manager.clone().start_periodic_checks();

        let engine = self.clone();
        let interval = Duration::from_secs(self.inner.config.heartbeat_interval_seconds);
        *self.inner.heartbeat_task.lock() = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                engine.send_heartbeat();
            }
        }));

        self.publish_system(SystemEvent::Startup {
            engine_name: self.inner.config.engine_name.clone(),
            instance_id: self.inner.config.instance_id.clone(),
            timestamp: startup_time,
        });

        info!(engine_name = %self.inner.config.engine_name, "trading engine started");
    }

    /// Announce shutdown and stop every task. Safe to call from any
    /// context, including from within a system-event handler; a second
    /// call warns and does nothing.
    pub async fn stop(&self) {
        let (shutdown_time, uptime_seconds) = {
            let mut state = self.inner.state.write();
            if !state.running {
                warn!("trading engine already stopped");
                return;
            }
            state.running = false;
            let now = Utc::now();
            state.shutdown_time = Some(now);
            (now, Self::uptime_between(state.startup_time, now))
        };

        info!(engine_name = %self.inner.config.engine_name, "stopping trading engine");

        self.publish_system(SystemEvent::Shutdown {
            engine_name: self.inner.config.engine_name.clone(),
            instance_id: self.inner.config.instance_id.clone(),
            timestamp: shutdown_time,
            uptime_seconds,
            stats: self.stats(),
        });

        self.inner.risk_manager.stop_periodic_checks().await;

        let heartbeat = self.inner.heartbeat_task.lock().take();
        if let Some(task) = heartbeat {
            task.abort();
            let _ = task.await;
        }

        // The dispatch loop finishes the event in flight and exits; it
        // is not awaited here because stop() may run inside one of its
        // handlers.
        self.inner.bus.stop();

        info!(engine_name = %self.inner.config.engine_name, "trading engine stopped");
    }

    /// Whether the engine is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.state.read().running
    }

    /// Publish a market data record on behalf of its source.
    pub fn process_market_data(&self, market_data: MarketData) -> bool {
        let source = market_data.source.clone();
        let sequence_id = market_data.sequence_id;
        let mut event = Event::new(EventPayload::MarketData(market_data), source);
        event.sequence_id = sequence_id;
        self.inner.bus.publish(event)
    }

    /// Submit an order. See [`OrderManager::submit_order`].
    pub fn submit_order(&self, order: Order, callback: Option<Arc<dyn OrderCallback>>) -> Uuid {
        self.inner.order_manager.submit_order(order, callback)
    }

    /// Request cancellation of an order. See [`OrderManager::cancel_order`].
    pub fn cancel_order(&self, order_id: &Uuid) -> bool {
        self.inner.order_manager.cancel_order(order_id)
    }

    /// Position for an instrument, created flat if absent.
    #[must_use]
    pub fn get_position(&self, instrument_id: &str) -> Position {
        self.inner.position_manager.get_position(instrument_id)
    }

    /// Every known position.
    #[must_use]
    pub fn get_all_positions(&self) -> Vec<Position> {
        self.inner.position_manager.get_all_positions()
    }

    /// Register a market data source and announce it.
    pub fn register_data_source(&self, source_id: impl Into<String>) {
        let source_id = source_id.into();
        self.inner.data_sources.write().insert(source_id.clone());
        info!(source_id, "data source registered");
        self.publish_system(SystemEvent::DataSourceRegistered {
            source_id,
            timestamp: Utc::now(),
        });
    }

    /// Register a strategy and announce it.
    pub fn register_strategy(&self, strategy_id: impl Into<String>, info: serde_json::Value) {
        let strategy_id = strategy_id.into();
        self.inner.strategies.write().insert(
            strategy_id.clone(),
            StrategyRegistration { info: info.clone(), registered_at: Utc::now() },
        );
        info!(strategy_id, "strategy registered");
        self.publish_system(SystemEvent::StrategyRegistered {
            strategy_id,
            strategy_info: info,
            timestamp: Utc::now(),
        });
    }

    /// Emit a heartbeat with queue depth, active orders, and position
    /// count, at heartbeat priority.
    pub fn send_heartbeat(&self) {
        let now = Utc::now();
        let uptime_seconds = {
            let mut state = self.inner.state.write();
            state.last_heartbeat = Some(now);
            Self::uptime_between(state.startup_time, now)
        };

        let event = Event::new(
            EventPayload::SystemEvent(SystemEvent::Heartbeat {
                engine_name: self.inner.config.engine_name.clone(),
                instance_id: self.inner.config.instance_id.clone(),
                timestamp: now,
                uptime_seconds,
                event_queue_size: self.inner.bus.queue_depth(),
                active_orders: self.inner.order_manager.active_order_count(),
                positions_count: self.inner.position_manager.position_count(),
            }),
            SOURCE,
        )
        .with_priority(HEARTBEAT_PRIORITY);
        self.inner.bus.publish(event);
    }

    /// Emit a full status event with every component's statistics.
    pub fn publish_status(&self) {
        let now = Utc::now();
        let uptime_seconds = Self::uptime_between(self.inner.state.read().startup_time, now);

        self.publish_system(SystemEvent::Status {
            engine_name: self.inner.config.engine_name.clone(),
            instance_id: self.inner.config.instance_id.clone(),
            timestamp: now,
            uptime_seconds,
            performance: self.inner.bus.metrics(),
            orders: self.inner.order_manager.get_order_statistics(),
            positions: self.inner.position_manager.get_position_statistics(),
            risk: self.inner.risk_manager.get_risk_summary(),
            stats: self.stats(),
        });
    }

    /// Aggregated engine status.
    #[must_use]
    pub fn get_engine_status(&self) -> EngineStatus {
        let now = Utc::now();
        let state = self.inner.state.read();
        EngineStatus {
            engine_name: self.inner.config.engine_name.clone(),
            instance_id: self.inner.config.instance_id.clone(),
            running: state.running,
            startup_time: state.startup_time,
            shutdown_time: state.shutdown_time,
            current_time: now,
            uptime_seconds: Self::uptime_between(state.startup_time, now),
            last_heartbeat: state.last_heartbeat,
            orders: self.inner.order_manager.get_order_statistics(),
            positions: self.inner.position_manager.get_position_statistics(),
            risk_rules: self.inner.risk_manager.get_rule_status(),
            risk_summary: self.inner.risk_manager.get_risk_summary(),
            event_bus: self.inner.bus.metrics(),
            stats: self.stats(),
            data_sources: self.inner.data_sources.read().iter().cloned().collect(),
            strategies: self.inner.strategies.read().clone(),
        }
    }

    /// The bus, for external producers and subscribers.
    #[must_use]
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    /// The order manager.
    #[must_use]
    pub fn order_manager(&self) -> &Arc<OrderManager> {
        &self.inner.order_manager
    }

    /// The position manager.
    #[must_use]
    pub fn position_manager(&self) -> &Arc<PositionManager> {
        &self.inner.position_manager
    }

    /// The risk manager.
    #[must_use]
    pub fn risk_manager(&self) -> &Arc<RiskManager> {
        &self.inner.risk_manager
    }

    fn stats(&self) -> EngineStats {
        EngineStats {
            events_processed: self.inner.bus.metrics().events_dispatched,
            orders_submitted: self.inner.counters.orders_submitted.load(Ordering::Relaxed),
            trades_executed: self.inner.counters.trades_executed.load(Ordering::Relaxed),
        }
    }

    fn publish_system(&self, event: SystemEvent) {
        self.inner.bus.publish(Event::new(EventPayload::SystemEvent(event), SOURCE));
    }

    fn uptime_between(startup: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
        startup.map_or(0.0, |started| (now - started).num_milliseconds() as f64 / 1000.0)
    }

    async fn on_system_event(&self, event: &SystemEvent) {
        match event {
            SystemEvent::Shutdown { .. } => {
                info!("shutdown event received");
                self.stop().await;
            }
            SystemEvent::HeartbeatRequest => self.send_heartbeat(),
            SystemEvent::StatusRequest => self.publish_status(),
            _ => {}
        }
    }
}

#[async_trait]
impl EventHandler for TradingEngine {
    async fn handle(&self, event: &Event) -> Result<()> {
        match &event.payload {
            EventPayload::SystemEvent(system_event) => self.on_system_event(system_event).await,
            EventPayload::OrderUpdate(order) => {
                if order.status == common::OrderStatus::PendingNew {
                    self.inner.counters.orders_submitted.fetch_add(1, Ordering::Relaxed);
                }
            }
            EventPayload::TradeUpdate(_) => {
                self.inner.counters.trades_executed.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        Ok(())
    }

    fn name(&self) -> &str {
        SOURCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    struct SystemRecorder {
        seen: PlMutex<Vec<String>>,
    }

    impl SystemRecorder {
        fn new() -> Arc<Self> {
            Arc::new(Self { seen: PlMutex::new(Vec::new()) })
        }

        fn kinds(&self) -> Vec<String> {
            self.seen.lock().clone()
        }
    }

    #[async_trait]
    impl EventHandler for SystemRecorder {
        async fn handle(&self, event: &Event) -> Result<()> {
            if let EventPayload::SystemEvent(system_event) = &event.payload {
                let kind = match system_event {
                    SystemEvent::Startup { .. } => "startup",
                    SystemEvent::Shutdown { .. } => "shutdown",
                    SystemEvent::Heartbeat { .. } => "heartbeat",
                    SystemEvent::Status { .. } => "status",
                    SystemEvent::HeartbeatRequest => "heartbeat_request",
                    SystemEvent::StatusRequest => "status_request",
                    SystemEvent::DataSourceRegistered { .. } => "data_source_registered",
                    SystemEvent::StrategyRegistered { .. } => "strategy_registered",
                };
                self.seen.lock().push(kind.to_string());
            }
            Ok(())
        }

        fn name(&self) -> &str {
            "system_recorder"
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not met within timeout");
    }

    #[tokio::test]
    async fn start_and_stop_toggle_running() {
        let engine = TradingEngine::new(EngineConfig::default());
        assert!(!engine.is_running());

        engine.start();
        assert!(engine.is_running());

        // Second start is a warning, not an error.
        engine.start();
        assert!(engine.is_running());

        engine.stop().await;
        assert!(!engine.is_running());
        engine.stop().await;
    }

    #[tokio::test]
    async fn startup_and_heartbeat_events_flow() {
        let config = EngineConfig { heartbeat_interval_seconds: 1, ..Default::default() };
        let engine = TradingEngine::new(config);
        let recorder = SystemRecorder::new();
        engine.event_bus().add_handler(EventType::SystemEvent, recorder.clone());

        engine.start();
        wait_until(|| {
            let kinds = recorder.kinds();
            kinds.contains(&"startup".to_string()) && kinds.contains(&"heartbeat".to_string())
        })
        .await;

        let status = engine.get_engine_status();
        assert!(status.running);
        assert!(status.last_heartbeat.is_some());

        engine.stop().await;
    }

    #[tokio::test]
    async fn status_request_produces_status_event() {
        let engine = TradingEngine::new(EngineConfig::default());
        let recorder = SystemRecorder::new();
        engine.event_bus().add_handler(EventType::SystemEvent, recorder.clone());

        engine.start();
        engine
            .event_bus()
            .publish(Event::new(EventPayload::SystemEvent(SystemEvent::StatusRequest), "test"));

        wait_until(|| recorder.kinds().contains(&"status".to_string())).await;
        engine.stop().await;
    }

    #[tokio::test]
    async fn registrations_announce_and_report() {
        let engine = TradingEngine::new(EngineConfig::default());
        engine.register_data_source("feed-1");
        engine.register_strategy("momentum_v1", serde_json::json!({"lookback": 20}));

        let status = engine.get_engine_status();
        assert_eq!(status.data_sources, vec!["feed-1".to_string()]);
        assert!(status.strategies.contains_key("momentum_v1"));
    }
}
