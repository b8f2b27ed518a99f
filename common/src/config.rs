//! Engine configuration
//!
//! The shell is constructed from a plain [`EngineConfig`] value; how
//! that value is produced (file, environment, defaults) is the
//! caller's concern.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_engine_name() -> String {
    "TradingEngine".to_string()
}

fn default_instance_id() -> String {
    "main".to_string()
}

const fn default_event_queue_size() -> usize {
    100_000
}

const fn default_heartbeat_interval() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_check_interval() -> u64 {
    60
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable line format
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Display name of the engine
    pub engine_name: String,
    /// Identifier of this engine instance
    pub instance_id: String,
    /// Capacity of the event queue
    pub event_queue_size: usize,
    /// Seconds between heartbeats
    pub heartbeat_interval_seconds: u64,
    /// Log level filter (tracing env-filter syntax)
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Optional log file; console-only when absent
    pub log_file: Option<PathBuf>,
    /// Risk limits handed to the risk manager
    pub risk_limits: RiskLimitsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_name: default_engine_name(),
            instance_id: default_instance_id(),
            event_queue_size: default_event_queue_size(),
            heartbeat_interval_seconds: default_heartbeat_interval(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            log_file: None,
            risk_limits: RiskLimitsConfig::default(),
        }
    }
}

/// Risk limits recognized at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimitsConfig {
    /// Maximum absolute position per instrument
    pub position_limits: FxHashMap<String, f64>,
    /// Maximum portfolio drawdown in percent
    pub max_drawdown_pct: Option<f64>,
    /// Rolling window for the drawdown peak, in days
    pub drawdown_window_days: Option<u32>,
    /// Maximum gross exposure per strategy
    pub strategy_exposure_limits: FxHashMap<String, f64>,
    /// Seconds between periodic portfolio sweeps
    pub check_interval_seconds: u64,
}

impl Default for RiskLimitsConfig {
    fn default() -> Self {
        Self {
            position_limits: FxHashMap::default(),
            max_drawdown_pct: None,
            drawdown_window_days: None,
            strategy_exposure_limits: FxHashMap::default(),
            check_interval_seconds: default_check_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.engine_name, "TradingEngine");
        assert_eq!(config.instance_id, "main");
        assert_eq!(config.event_queue_size, 100_000);
        assert_eq!(config.heartbeat_interval_seconds, 5);
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.risk_limits.check_interval_seconds, 60);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let json = r#"{
            "engine_name": "sim-engine",
            "risk_limits": {
                "position_limits": { "BTC-USD": 5.0 },
                "max_drawdown_pct": 10.0
            }
        }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.engine_name, "sim-engine");
        assert_eq!(config.instance_id, "main");
        assert_eq!(config.risk_limits.position_limits["BTC-USD"], 5.0);
        assert_eq!(config.risk_limits.max_drawdown_pct, Some(10.0));
        assert_eq!(config.risk_limits.drawdown_window_days, None);
        assert_eq!(config.risk_limits.check_interval_seconds, 60);
    }
}
