//! Risk manager
//!
//! Holds the rule registry, gates new orders as they appear on the bus,
//! and sweeps the portfolio on a timer. The risk manager reads the
//! order and position managers directly but talks back to the rest of
//! the engine only through events.

use crate::order_manager::OrderManager;
use crate::position_manager::PositionManager;
use crate::rules::{
    DrawdownLimitRule, ExposureByStrategyRule, PositionLimitRule, RiskContext, RiskRule,
};
use anyhow::Result;
use async_trait::async_trait;
use bus::{EventBus, EventHandler};
use chrono::Utc;
use common::{
    Event, EventPayload, Order, OrderStatus, RiskCheckKind, RiskCheckReport, RiskLimitsConfig,
    RiskSummary, RuleStatus,
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const SOURCE: &str = "risk_manager";

/// Default window for the drawdown peak when none is configured.
const DEFAULT_DRAWDOWN_WINDOW_DAYS: u32 = 1;

/// The risk manager.
pub struct RiskManager {
    bus: Arc<EventBus>,
    order_manager: Arc<OrderManager>,
    position_manager: Arc<PositionManager>,
    rules: RwLock<Vec<Arc<dyn RiskRule>>>,
    check_interval: Duration,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
}

impl RiskManager {
    /// Create a risk manager and build rules from the configuration:
    /// one position limit per configured instrument, a drawdown limit
    /// when `max_drawdown_pct` is set, and one exposure limit per
    /// configured strategy.
    #[must_use]
    pub fn new(
        bus: Arc<EventBus>,
        order_manager: Arc<OrderManager>,
        position_manager: Arc<PositionManager>,
        config: &RiskLimitsConfig,
    ) -> Self {
        let manager = Self {
            bus,
            order_manager,
            position_manager,
            rules: RwLock::new(Vec::new()),
            check_interval: Duration::from_secs(config.check_interval_seconds),
            sweep_task: Mutex::new(None),
        };

        let mut instruments: Vec<_> = config.position_limits.iter().collect();
        instruments.sort_by(|a, b| a.0.cmp(b.0));
        for (instrument_id, limit) in instruments {
            manager.add_rule(Arc::new(PositionLimitRule::new(
                instrument_id.clone(),
                *limit,
                manager.position_manager.clone(),
            )));
        }

        if let Some(max_drawdown_pct) = config.max_drawdown_pct {
            let window_days =
                config.drawdown_window_days.unwrap_or(DEFAULT_DRAWDOWN_WINDOW_DAYS);
            manager.add_rule(Arc::new(DrawdownLimitRule::new(
                max_drawdown_pct,
                window_days,
                manager.position_manager.clone(),
            )));
        }

        let mut strategies: Vec<_> = config.strategy_exposure_limits.iter().collect();
        strategies.sort_by(|a, b| a.0.cmp(b.0));
        for (strategy_id, limit) in strategies {
            manager.add_rule(Arc::new(ExposureByStrategyRule::new(
                strategy_id.clone(),
                *limit,
                manager.position_manager.clone(),
            )));
        }

        manager
    }

    /// Register a rule. Rules evaluate in registration order.
    pub fn add_rule(&self, rule: Arc<dyn RiskRule>) {
        info!(rule = rule.name(), "risk rule registered");
        self.rules.write().push(rule);
    }

    /// Remove a rule by name. Returns whether a rule was removed.
    pub fn remove_rule(&self, name: &str) -> bool {
        let mut rules = self.rules.write();
        let Some(index) = rules.iter().position(|rule| rule.name() == name) else {
            return false;
        };
        rules.remove(index);
        true
    }

    /// Evaluate every enabled rule against the context.
    ///
    /// Returns whether all rules passed plus one message per failure.
    /// A rule that returns an error counts as failed with a diagnostic
    /// message; it never aborts the round.
    pub async fn check_rules(&self, context: &RiskContext<'_>) -> (bool, Vec<String>) {
        let rules: Vec<Arc<dyn RiskRule>> = self.rules.read().clone();
        let mut all_passed = true;
        let mut messages = Vec::new();

        for rule in rules {
            if !rule.enabled() {
                continue;
            }
            match rule.check(context).await {
                Ok(verdict) => {
                    if !verdict.passed {
                        all_passed = false;
                        messages.push(format!("{}: {}", rule.name(), verdict.message));
                    }
                }
                Err(error) => {
                    error!(rule = rule.name(), %error, "risk rule check failed");
                    all_passed = false;
                    messages.push(format!("{}: error during check - {error}", rule.name()));
                }
            }
        }

        (all_passed, messages)
    }

    /// Start the periodic portfolio sweep.
    pub fn start_periodic_checks(self: Arc<Self>) {
        let manager = self.clone();
        let interval = self.check_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                manager.periodic_check().await;
            }
        });
        *self.sweep_task.lock() = Some(task);
    }

    /// Stop the periodic sweep and wait for the task to finish.
    pub async fn stop_periodic_checks(&self) {
        let task = self.sweep_task.lock().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
    }

    /// Status of every registered rule.
    #[must_use]
    pub fn get_rule_status(&self) -> Vec<RuleStatus> {
        self.rules.read().iter().map(|rule| rule.status()).collect()
    }

    /// Portfolio-level risk summary.
    #[must_use]
    pub fn get_risk_summary(&self) -> RiskSummary {
        let positions = self.position_manager.get_all_positions();

        let gross_exposure: f64 = positions.iter().map(|p| p.position_value.abs()).sum();
        let net_exposure: f64 = positions.iter().map(|p| p.position_value).sum();
        let long_exposure: f64 =
            positions.iter().filter(|p| p.quantity > 0.0).map(|p| p.position_value).sum();
        let short_exposure: f64 =
            positions.iter().filter(|p| p.quantity < 0.0).map(|p| p.position_value).sum();
        let long_short_ratio = if short_exposure == 0.0 {
            None
        } else {
            Some(long_exposure / short_exposure.abs())
        };

        let pnl_values: Vec<f64> = positions.iter().map(|p| p.unrealized_pnl).collect();
        let pnl_volatility = if pnl_values.is_empty() {
            0.0
        } else {
            let mean = pnl_values.iter().sum::<f64>() / pnl_values.len() as f64;
            let variance = pnl_values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                / pnl_values.len() as f64;
            variance.sqrt()
        };

        let rules = self.rules.read();
        RiskSummary {
            gross_exposure,
            net_exposure,
            long_exposure,
            short_exposure,
            long_short_ratio,
            pnl_volatility,
            rule_violations: rules.iter().map(|rule| rule.violations()).sum(),
            active_rules: rules.iter().filter(|rule| rule.enabled()).count(),
            timestamp: Utc::now(),
        }
    }

    /// Read access to the order manager, for rules and reporting.
    #[must_use]
    pub fn order_manager(&self) -> &Arc<OrderManager> {
        &self.order_manager
    }

    /// Gate a freshly submitted order. On failure the order is
    /// republished as `Rejected` and a RISK_CHECK report is emitted.
    async fn on_order_update(&self, order: &Order) {
        if order.status != OrderStatus::PendingNew {
            return;
        }

        let (passed, messages) = self.check_rules(&RiskContext::for_order(order)).await;
        if passed {
            return;
        }

        warn!(order_id = %order.order_id, ?messages, "order rejected by risk check");

        let mut rejected = order.clone();
        rejected.status = OrderStatus::Rejected;
        rejected.updated_at = Utc::now();
        self.bus.publish(Event::new(EventPayload::OrderUpdate(rejected), SOURCE));

        self.bus.publish(Event::new(
            EventPayload::RiskCheck(RiskCheckReport {
                passed: false,
                order_id: Some(order.order_id),
                messages,
                timestamp: Utc::now(),
                check_type: Some(RiskCheckKind::Order),
            }),
            SOURCE,
        ));
    }

    /// One periodic sweep round.
    async fn periodic_check(&self) {
        let (passed, messages) = self.check_rules(&RiskContext::periodic()).await;
        if passed {
            return;
        }

        warn!(?messages, "periodic risk check failed");
        self.bus.publish(Event::new(
            EventPayload::RiskCheck(RiskCheckReport {
                passed: false,
                order_id: None,
                messages,
                timestamp: Utc::now(),
                check_type: Some(RiskCheckKind::Periodic),
            }),
            SOURCE,
        ));
    }
}

#[async_trait]
impl EventHandler for RiskManager {
    async fn handle(&self, event: &Event) -> Result<()> {
        if let EventPayload::OrderUpdate(order) = &event.payload {
            self.on_order_update(order).await;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        SOURCE
    }
}
