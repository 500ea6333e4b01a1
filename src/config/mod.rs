//! Configuration structures for the trading pipeline
//!
//! Every knob recognized by the pipeline lives here with its default, so a
//! partial TOML file (or none at all) yields a working configuration.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::broker::TimeInForce;
use crate::core::AggregationMethod;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub risk: RiskParameters,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub exits: ExitConditions,
}

impl Config {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Knobs for combining per-strategy signals into one decision.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub method: AggregationMethod,
    /// Minimum number of distinct strategies required before aggregating.
    pub min_strategies: usize,
    /// Buy/sell score gap below which the result resolves to hold.
    pub conflict_threshold: f64,
    /// Group size at which corroboration confidence saturates to 1.0.
    pub confidence_saturation: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            method: AggregationMethod::WeightedAverage,
            min_strategies: 2,
            conflict_threshold: 0.1,
            confidence_saturation: 5.0,
        }
    }
}

/// Portfolio-level risk limits, expressed in percent of portfolio value.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RiskParameters {
    pub max_position_size_percent: f64,
    pub max_total_exposure_percent: f64,
    pub max_daily_loss_percent: f64,
    pub max_drawdown_percent: f64,
    pub stop_loss_percent: f64,
    pub take_profit_percent: f64,
    pub max_positions: usize,
    /// Minimum daily volume, only enforced when a volume source is wired in.
    pub min_liquidity_volume: f64,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            max_position_size_percent: 5.0,  // Max 5% of portfolio per position
            max_total_exposure_percent: 80.0, // Max 80% of portfolio invested
            max_daily_loss_percent: 2.0,     // Max 2% daily loss
            max_drawdown_percent: 10.0,      // Max 10% drawdown
            stop_loss_percent: 5.0,          // 5% stop loss
            take_profit_percent: 15.0,       // 15% take profit
            max_positions: 20,               // Max number of open positions
            min_liquidity_volume: 100_000.0, // Min daily volume
        }
    }
}

/// Order submission and monitoring settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub order_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub default_time_in_force: TimeInForce,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,        // Submission attempts before giving up
            retry_delay_secs: 5,   // Fixed delay between attempts
            order_timeout_secs: 60, // Polling budget per order
            poll_interval_secs: 2, // Status check cadence
            default_time_in_force: TimeInForce::Day,
        }
    }
}

/// Exit thresholds evaluated by the position monitor.
///
/// Expressed as fractions of entry price, not percents; the monitor compares
/// them directly against signed P&L ratios.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExitConditions {
    pub stop_loss_percent: f64,
    pub take_profit_percent: f64,
    pub trailing_stop_percent: f64,
    pub max_holding_period_days: i64,
}

impl Default for ExitConditions {
    fn default() -> Self {
        Self {
            stop_loss_percent: 0.03,     // 3% stop loss
            take_profit_percent: 0.08,   // 8% take profit
            trailing_stop_percent: 0.02, // 2% pullback from peak
            max_holding_period_days: 30, // Force review after a month
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.execution.max_retries, 3);
        assert_eq!(config.execution.retry_delay_secs, 5);
        assert_eq!(config.execution.order_timeout_secs, 60);
        assert_eq!(config.risk.max_position_size_percent, 5.0);
        assert_eq!(config.risk.max_total_exposure_percent, 80.0);
        assert_eq!(config.risk.max_positions, 20);
        assert_eq!(config.aggregation.min_strategies, 2);
        assert_eq!(config.aggregation.conflict_threshold, 0.1);
        assert_eq!(config.exits.max_holding_period_days, 30);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[risk]\nmax_position_size_percent = 2.5\n\n[execution]\nmax_retries = 5\n"
        )
        .unwrap();

        let config = Config::load_from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.risk.max_position_size_percent, 2.5);
        assert_eq!(config.execution.max_retries, 5);
        // Untouched sections keep their defaults
        assert_eq!(config.risk.max_total_exposure_percent, 80.0);
        assert_eq!(config.execution.order_timeout_secs, 60);
        assert_eq!(config.aggregation.min_strategies, 2);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.execution.max_retries, config.execution.max_retries);
        assert_eq!(
            parsed.aggregation.confidence_saturation,
            config.aggregation.confidence_saturation
        );
    }
}
