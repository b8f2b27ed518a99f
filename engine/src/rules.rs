//! Risk rules
//!
//! A rule inspects an order (pre-trade) or the portfolio (periodic) and
//! answers passed/failed with a message. Rules read the position
//! manager through a one-way reference; they never mutate engine state.

use crate::position_manager::PositionManager;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{Order, OrderSide, RiskCheckKind, RuleStatus};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// What a rule is being asked to look at.
pub struct RiskContext<'a> {
    /// Order being gated, for pre-trade checks
    pub order: Option<&'a Order>,
    /// Which path triggered the check
    pub kind: RiskCheckKind,
}

impl<'a> RiskContext<'a> {
    /// Pre-trade context for one order.
    #[must_use]
    pub const fn for_order(order: &'a Order) -> Self {
        Self { order: Some(order), kind: RiskCheckKind::Order }
    }

    /// Periodic portfolio context.
    #[must_use]
    pub const fn periodic() -> Self {
        Self { order: None, kind: RiskCheckKind::Periodic }
    }
}

/// Outcome of one rule evaluation.
#[derive(Debug, Clone)]
pub struct RuleVerdict {
    /// Whether the rule passed
    pub passed: bool,
    /// Human-readable explanation
    pub message: String,
}

impl RuleVerdict {
    /// Passing verdict.
    #[must_use]
    pub fn pass(message: impl Into<String>) -> Self {
        Self { passed: true, message: message.into() }
    }

    /// Failing verdict.
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self { passed: false, message: message.into() }
    }
}

/// Bookkeeping shared by every rule: name, enabled flag, violation
/// counter, and last-check timestamp.
pub struct RuleState {
    name: String,
    enabled: AtomicBool,
    violations: AtomicU64,
    last_checked: Mutex<Option<DateTime<Utc>>>,
}

impl RuleState {
    /// Create enabled state with a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: AtomicBool::new(true),
            violations: AtomicU64::new(0),
            last_checked: Mutex::new(None),
        }
    }

    /// Stamp the last-check time. Rules call this on entry to `check`.
    pub fn touch(&self) {
        *self.last_checked.lock() = Some(Utc::now());
    }

    /// Record a violation.
    pub fn violation(&self) {
        self.violations.fetch_add(1, Ordering::Relaxed);
    }
}

/// A risk rule.
#[async_trait]
pub trait RiskRule: Send + Sync {
    /// Shared bookkeeping state.
    fn state(&self) -> &RuleState;

    /// Evaluate the rule. An `Err` is treated by the caller as a failed
    /// rule with a diagnostic message.
    async fn check(&self, context: &RiskContext<'_>) -> Result<RuleVerdict>;

    /// Rule name.
    fn name(&self) -> &str {
        &self.state().name
    }

    /// Whether the rule participates in checks.
    fn enabled(&self) -> bool {
        self.state().enabled.load(Ordering::Relaxed)
    }

    /// Enable or disable the rule.
    fn set_enabled(&self, enabled: bool) {
        self.state().enabled.store(enabled, Ordering::Relaxed);
    }

    /// Violations recorded so far.
    fn violations(&self) -> u64 {
        self.state().violations.load(Ordering::Relaxed)
    }

    /// When the rule last ran.
    fn last_checked(&self) -> Option<DateTime<Utc>> {
        *self.state().last_checked.lock()
    }

    /// Status snapshot for reporting.
    fn status(&self) -> RuleStatus {
        RuleStatus {
            name: self.name().to_string(),
            enabled: self.enabled(),
            violations: self.violations(),
            last_check: self.last_checked(),
        }
    }
}

/// Caps the absolute position in one instrument.
pub struct PositionLimitRule {
    state: RuleState,
    instrument_id: String,
    max_position: f64,
    positions: Arc<PositionManager>,
}

impl PositionLimitRule {
    /// Create a limit of `max_position` absolute units on `instrument_id`.
    #[must_use]
    pub fn new(
        instrument_id: impl Into<String>,
        max_position: f64,
        positions: Arc<PositionManager>,
    ) -> Self {
        let instrument_id = instrument_id.into();
        Self {
            state: RuleState::new(format!("Position limit for {instrument_id}")),
            instrument_id,
            max_position,
            positions,
        }
    }
}

#[async_trait]
impl RiskRule for PositionLimitRule {
    fn state(&self) -> &RuleState {
        &self.state
    }

    async fn check(&self, context: &RiskContext<'_>) -> Result<RuleVerdict> {
        self.state.touch();

        if let Some(order) = context.order {
            if order.instrument_id != self.instrument_id {
                return Ok(RuleVerdict::pass("rule not applicable to this instrument"));
            }
        }

        let position = self.positions.get_position(&self.instrument_id);

        if let Some(order) = context.order {
            let prospective = match order.side {
                OrderSide::Buy => (position.quantity + order.quantity).abs(),
                OrderSide::Sell => (position.quantity - order.quantity).abs(),
            };
            if prospective > self.max_position {
                self.state.violation();
                return Ok(RuleVerdict::fail(format!(
                    "order would exceed position limit of {} for {}",
                    self.max_position, self.instrument_id
                )));
            }
        } else if position.quantity.abs() > self.max_position {
            self.state.violation();
            return Ok(RuleVerdict::fail(format!(
                "current position of {} exceeds limit of {} for {}",
                position.quantity.abs(),
                self.max_position,
                self.instrument_id
            )));
        }

        Ok(RuleVerdict::pass("position within limits"))
    }
}

/// Caps portfolio drawdown against a rolling peak.
///
/// The peak is the highest total P&L observed within the configured
/// window; samples older than the window roll off. A non-positive peak
/// passes unconditionally.
pub struct DrawdownLimitRule {
    state: RuleState,
    max_drawdown_pct: f64,
    window: Duration,
    positions: Arc<PositionManager>,
    samples: Mutex<VecDeque<(DateTime<Utc>, f64)>>,
}

impl DrawdownLimitRule {
    /// Create a drawdown limit of `max_drawdown_pct` percent over a
    /// rolling window of `window_days` days.
    #[must_use]
    pub fn new(max_drawdown_pct: f64, window_days: u32, positions: Arc<PositionManager>) -> Self {
        Self {
            state: RuleState::new(format!("Drawdown limit of {max_drawdown_pct}%")),
            max_drawdown_pct,
            window: Duration::days(i64::from(window_days)),
            positions,
            samples: Mutex::new(VecDeque::new()),
        }
    }
}

#[async_trait]
impl RiskRule for DrawdownLimitRule {
    fn state(&self) -> &RuleState {
        &self.state
    }

    async fn check(&self, _context: &RiskContext<'_>) -> Result<RuleVerdict> {
        self.state.touch();

        let summary = self.positions.get_pnl_summary();
        let current = summary.total_pnl;
        let now = Utc::now();

        let peak = {
            let mut samples = self.samples.lock();
            samples.push_back((now, current));
            let horizon = now - self.window;
            while samples.front().is_some_and(|(at, _)| *at < horizon) {
                samples.pop_front();
            }
            samples.iter().map(|(_, value)| *value).fold(f64::MIN, f64::max)
        };

        if peak <= 0.0 {
            return Ok(RuleVerdict::pass("no peak value established yet"));
        }

        let drawdown_pct = (peak - current) / peak.abs() * 100.0;
        if drawdown_pct > self.max_drawdown_pct {
            self.state.violation();
            return Ok(RuleVerdict::fail(format!(
                "current drawdown of {drawdown_pct:.2}% exceeds limit of {}%",
                self.max_drawdown_pct
            )));
        }

        Ok(RuleVerdict::pass(format!("current drawdown of {drawdown_pct:.2}% within limits")))
    }
}

/// Caps the gross exposure attributed to one strategy.
pub struct ExposureByStrategyRule {
    state: RuleState,
    strategy_id: String,
    max_exposure: f64,
    positions: Arc<PositionManager>,
}

impl ExposureByStrategyRule {
    /// Create an exposure limit of `max_exposure` for `strategy_id`.
    #[must_use]
    pub fn new(
        strategy_id: impl Into<String>,
        max_exposure: f64,
        positions: Arc<PositionManager>,
    ) -> Self {
        let strategy_id = strategy_id.into();
        Self {
            state: RuleState::new(format!("Exposure limit for strategy {strategy_id}")),
            strategy_id,
            max_exposure,
            positions,
        }
    }

    fn current_exposure(&self) -> f64 {
        self.positions
            .get_strategy_exposure(&self.strategy_id)
            .into_iter()
            .filter_map(|(instrument_id, quantity)| {
                let position = self.positions.get_position(&instrument_id);
                position.current_price.map(|price| (quantity * price).abs())
            })
            .sum()
    }
}

#[async_trait]
impl RiskRule for ExposureByStrategyRule {
    fn state(&self) -> &RuleState {
        &self.state
    }

    async fn check(&self, context: &RiskContext<'_>) -> Result<RuleVerdict> {
        self.state.touch();

        if let Some(order) = context.order {
            if order.strategy_id.as_deref() != Some(self.strategy_id.as_str()) {
                return Ok(RuleVerdict::pass("rule not applicable to this strategy"));
            }
        }

        let total_exposure = self.current_exposure();

        if let Some(order) = context.order {
            let price = order.price.unwrap_or_else(|| {
                self.positions
                    .get_position(&order.instrument_id)
                    .current_price
                    .unwrap_or(0.0)
            });
            let prospective = total_exposure + order.quantity * price;
            if prospective > self.max_exposure {
                self.state.violation();
                return Ok(RuleVerdict::fail(format!(
                    "order would exceed exposure limit of {} for strategy {}",
                    self.max_exposure, self.strategy_id
                )));
            }
        } else if total_exposure > self.max_exposure {
            self.state.violation();
            return Ok(RuleVerdict::fail(format!(
                "current exposure of {} exceeds limit of {} for strategy {}",
                total_exposure, self.max_exposure, self.strategy_id
            )));
        }

        Ok(RuleVerdict::pass(format!("strategy exposure of {total_exposure} within limits")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bus::EventBus;
    use common::{OrderType, Trade};
    use uuid::Uuid;

    fn positions() -> Arc<PositionManager> {
        Arc::new(PositionManager::new(Arc::new(EventBus::new(1000))))
    }

    fn seed_trade(positions: &PositionManager, instrument: &str, side: OrderSide, qty: f64, px: f64) {
        positions.on_trade_update(&Trade::new(Uuid::new_v4(), instrument, side, qty, px));
    }

    #[tokio::test]
    async fn position_limit_ignores_other_instruments() {
        let positions = positions();
        let rule = PositionLimitRule::new("X", 5.0, positions);
        let order = Order::new("Y", OrderType::Market, OrderSide::Buy, 100.0);
        let verdict = rule.check(&RiskContext::for_order(&order)).await.unwrap();
        assert!(verdict.passed);
        assert_eq!(rule.violations(), 0);
    }

    #[tokio::test]
    async fn position_limit_blocks_prospective_breach() {
        let positions = positions();
        seed_trade(&positions, "X", OrderSide::Buy, 4.0, 100.0);
        let rule = PositionLimitRule::new("X", 5.0, positions.clone());

        let order = Order::new("X", OrderType::Market, OrderSide::Buy, 2.0);
        let verdict = rule.check(&RiskContext::for_order(&order)).await.unwrap();
        assert!(!verdict.passed);
        assert!(verdict.message.contains("position limit"));
        assert_eq!(rule.violations(), 1);

        // Selling reduces the position and passes.
        let sell = Order::new("X", OrderType::Market, OrderSide::Sell, 2.0);
        let verdict = rule.check(&RiskContext::for_order(&sell)).await.unwrap();
        assert!(verdict.passed);
    }

    #[tokio::test]
    async fn position_limit_periodic_checks_current() {
        let positions = positions();
        seed_trade(&positions, "X", OrderSide::Sell, 7.0, 100.0);
        let rule = PositionLimitRule::new("X", 5.0, positions);

        let verdict = rule.check(&RiskContext::periodic()).await.unwrap();
        assert!(!verdict.passed);
        assert!(verdict.message.contains("exceeds limit"));
    }

    #[tokio::test]
    async fn drawdown_passes_without_positive_peak() {
        let positions = positions();
        let rule = DrawdownLimitRule::new(10.0, 1, positions);
        let verdict = rule.check(&RiskContext::periodic()).await.unwrap();
        assert!(verdict.passed);
    }

    #[tokio::test]
    async fn drawdown_fails_after_peak_decay() {
        let positions = positions();
        let rule = DrawdownLimitRule::new(10.0, 1, positions.clone());

        // Establish a profitable peak.
        seed_trade(&positions, "X", OrderSide::Buy, 10.0, 100.0);
        positions.update_position_price("X", 110.0);
        let verdict = rule.check(&RiskContext::periodic()).await.unwrap();
        assert!(verdict.passed);

        // Give most of it back: drawdown (100 - 20) / 100 = 80%.
        positions.update_position_price("X", 102.0);
        let verdict = rule.check(&RiskContext::periodic()).await.unwrap();
        assert!(!verdict.passed);
        assert!(verdict.message.contains("drawdown"));
        assert_eq!(rule.violations(), 1);
    }

    #[tokio::test]
    async fn exposure_rule_counts_allocations_and_order() {
        let positions = positions();
        positions.add_strategy_allocation("X", "alpha", 3.0);
        positions.update_position_price("X", 100.0);

        let rule = ExposureByStrategyRule::new("alpha", 500.0, positions.clone());

        // Current exposure 300; order adds 150 -> 450, still inside.
        let order = Order::new("X", OrderType::Limit, OrderSide::Buy, 1.5)
            .with_price(100.0)
            .with_strategy("alpha");
        let verdict = rule.check(&RiskContext::for_order(&order)).await.unwrap();
        assert!(verdict.passed);

        // A bigger order crosses the limit.
        let order = Order::new("X", OrderType::Limit, OrderSide::Buy, 3.0)
            .with_price(100.0)
            .with_strategy("alpha");
        let verdict = rule.check(&RiskContext::for_order(&order)).await.unwrap();
        assert!(!verdict.passed);

        // Other strategies are not gated by this rule.
        let order = Order::new("X", OrderType::Limit, OrderSide::Buy, 50.0)
            .with_price(100.0)
            .with_strategy("beta");
        let verdict = rule.check(&RiskContext::for_order(&order)).await.unwrap();
        assert!(verdict.passed);
    }

    #[tokio::test]
    async fn disabled_flag_and_status() {
        let positions = positions();
        let rule = PositionLimitRule::new("X", 5.0, positions);
        assert!(rule.enabled());
        rule.set_enabled(false);
        assert!(!rule.enabled());

        let status = rule.status();
        assert_eq!(status.name, "Position limit for X");
        assert!(!status.enabled);
        assert_eq!(status.violations, 0);
    }
}
