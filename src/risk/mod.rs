//! Risk management
//!
//! Evaluates aggregated signals against portfolio-level constraints, sizes
//! the position, and computes stop-loss/take-profit reference prices. Rules
//! are pluggable by name; every registered rule runs on every evaluation so
//! callers always get the full diagnostic list.

pub mod rules;
pub mod stops;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::broker::{AccountInfo, OrderRequest, OrderSide, Position};
use crate::config::RiskParameters;
use crate::core::{AggregatedSignal, SignalDirection};

pub use rules::{
    DailyLossRule, LiquidityRule, MaxPositionsRule, PositionSizeRule, RiskRule, RuleOutcome,
    TotalExposureRule, VolumeSource,
};
pub use stops::{StopRegistry, StopWatch};

/// One rule's verdict, kept in evaluation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCheck {
    pub rule: String,
    pub passed: bool,
    pub reason: String,
}

/// Outcome of risk evaluation for one aggregated signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskDecision {
    pub approved: bool,
    /// Position size in account currency. Positive whenever approved.
    pub position_notional: f64,
    /// Position size in shares/units at the signal's reference price.
    pub quantity: f64,
    pub checks: Vec<RuleCheck>,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub rejection_reason: Option<String>,
}

/// Read-only portfolio risk snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub exposure_percent: f64,
    pub daily_pnl_percent: f64,
    pub drawdown_percent: f64,
    pub position_count: usize,
    /// 0-1, unweighted mean of exposure, P&L, concentration and drawdown
    /// sub-scores.
    pub risk_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSummary {
    pub metrics: RiskMetrics,
    pub parameters: RiskParameters,
    pub active_rules: Vec<String>,
    pub active_stops: usize,
    pub alerts: Vec<String>,
    pub recommendations: Vec<String>,
}

pub struct RiskManager {
    params: RiskParameters,
    rules: Vec<Box<dyn RiskRule>>,
    stops: StopRegistry,
}

impl RiskManager {
    /// Risk manager with the default rule set, in deterministic order:
    /// position size, total exposure, max positions, daily loss, liquidity.
    pub fn new(params: RiskParameters) -> Self {
        Self {
            params,
            rules: vec![
                Box::new(PositionSizeRule),
                Box::new(TotalExposureRule),
                Box::new(MaxPositionsRule),
                Box::new(DailyLossRule),
                Box::new(LiquidityRule::new()),
            ],
            stops: StopRegistry::new(),
        }
    }

    pub fn add_rule(&mut self, rule: Box<dyn RiskRule>) {
        info!(rule = rule.name(), "added risk rule");
        self.rules.push(rule);
    }

    pub fn remove_rule(&mut self, name: &str) {
        self.rules.retain(|r| r.name() != name);
        info!(rule = name, "removed risk rule");
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn parameters(&self) -> &RiskParameters {
        &self.params
    }

    pub fn update_parameters(&mut self, params: RiskParameters) {
        info!("updated risk parameters");
        self.params = params;
    }

    /// Evaluate an aggregated signal against all registered rules.
    ///
    /// Always returns the full per-rule diagnostic list; a failed or erroring
    /// rule does not stop the remaining rules from running.
    pub fn evaluate(
        &self,
        signal: &AggregatedSignal,
        account: &AccountInfo,
        positions: &[Position],
    ) -> RiskDecision {
        if !signal.is_actionable() {
            return RiskDecision {
                approved: false,
                position_notional: 0.0,
                quantity: 0.0,
                checks: Vec::new(),
                stop_loss_price: 0.0,
                take_profit_price: 0.0,
                rejection_reason: Some("hold signals are not tradable".to_string()),
            };
        }
        if signal.price <= 0.0 {
            return RiskDecision {
                approved: false,
                position_notional: 0.0,
                quantity: 0.0,
                checks: Vec::new(),
                stop_loss_price: 0.0,
                take_profit_price: 0.0,
                rejection_reason: Some("signal carries no reference price".to_string()),
            };
        }

        let side = match signal.direction {
            SignalDirection::Buy => OrderSide::Buy,
            SignalDirection::Sell => OrderSide::Sell,
            SignalDirection::Hold => unreachable!("hold rejected above"),
        };

        let (notional, quantity) = self.position_size(signal, account);
        let proposed = OrderRequest::limit(signal.symbol.clone(), side, quantity, signal.price);

        let mut checks = Vec::with_capacity(self.rules.len());
        let mut approved = true;

        for rule in &self.rules {
            match rule.evaluate(&proposed, account, positions, &self.params) {
                Ok(outcome) => {
                    if !outcome.passed {
                        approved = false;
                    }
                    checks.push(RuleCheck {
                        rule: rule.name().to_string(),
                        passed: outcome.passed,
                        reason: outcome.reason,
                    });
                }
                Err(e) => {
                    warn!(rule = rule.name(), error = %e, "risk rule evaluation failed");
                    approved = false;
                    checks.push(RuleCheck {
                        rule: rule.name().to_string(),
                        passed: false,
                        reason: format!("evaluation error: {e}"),
                    });
                }
            }
        }

        // A zero-sized position cannot be approved even if every rule passed.
        if approved && notional <= 0.0 {
            approved = false;
            checks.push(RuleCheck {
                rule: "position_sizing".to_string(),
                passed: false,
                reason: "computed position size is zero".to_string(),
            });
        }

        let rejection_reason = if approved {
            None
        } else {
            let failed: Vec<&str> = checks
                .iter()
                .filter(|c| !c.passed)
                .map(|c| c.rule.as_str())
                .collect();
            Some(format!("failed risk checks: {}", failed.join(", ")))
        };

        info!(
            symbol = %signal.symbol,
            approved,
            notional,
            "risk evaluation complete"
        );

        RiskDecision {
            approved,
            position_notional: notional,
            quantity,
            checks,
            stop_loss_price: self.stop_loss_price(signal.price, side),
            take_profit_price: self.take_profit_price(signal.price, side),
            rejection_reason,
        }
    }

    /// Notional and share quantity for a signal: base cap scaled by
    /// strength x confidence, never above the base cap.
    fn position_size(&self, signal: &AggregatedSignal, account: &AccountInfo) -> (f64, f64) {
        let base = account.portfolio_value * (self.params.max_position_size_percent / 100.0);
        let scaled = base * (signal.strength * signal.confidence);
        let notional = scaled.min(base).max(0.0);
        let quantity = notional / signal.price;
        (notional, quantity)
    }

    /// Stop price below entry for longs, above entry for shorts.
    pub fn stop_loss_price(&self, entry_price: f64, side: OrderSide) -> f64 {
        let fraction = self.params.stop_loss_percent / 100.0;
        match side {
            OrderSide::Buy => entry_price * (1.0 - fraction),
            OrderSide::Sell => entry_price * (1.0 + fraction),
        }
    }

    /// Target price above entry for longs, below entry for shorts.
    pub fn take_profit_price(&self, entry_price: f64, side: OrderSide) -> f64 {
        let fraction = self.params.take_profit_percent / 100.0;
        match side {
            OrderSide::Buy => entry_price * (1.0 + fraction),
            OrderSide::Sell => entry_price * (1.0 - fraction),
        }
    }

    /// Register a stop watch for a freshly opened position.
    pub fn set_stop_loss(&self, symbol: &str, entry_price: f64, side: OrderSide) -> f64 {
        let stop_price = self.stop_loss_price(entry_price, side);
        self.stops.set(symbol, stop_price, entry_price, side);
        stop_price
    }

    /// One-shot stop check; see [`StopRegistry::check`].
    pub fn check_stop_losses(&self, positions: &[Position]) -> Vec<String> {
        self.stops.check(positions)
    }

    pub fn stops(&self) -> &StopRegistry {
        &self.stops
    }

    pub fn portfolio_risk_metrics(
        &self,
        account: &AccountInfo,
        positions: &[Position],
    ) -> RiskMetrics {
        let (exposure_percent, daily_pnl_percent) = if account.portfolio_value > 0.0 {
            let exposure: f64 = positions.iter().map(|p| p.market_value).sum();
            let pnl: f64 = positions.iter().map(|p| p.unrealized_pnl).sum();
            (
                exposure / account.portfolio_value * 100.0,
                pnl / account.portfolio_value * 100.0,
            )
        } else {
            (0.0, 0.0)
        };

        // Without historical equity data, drawdown degrades to today's loss.
        let drawdown_percent = daily_pnl_percent.min(0.0);

        let sub_scores = [
            (exposure_percent / 100.0).min(1.0),
            (daily_pnl_percent.abs() / 10.0).min(1.0),
            (positions.len() as f64 / 50.0).min(1.0),
            (drawdown_percent.abs() / 20.0).min(1.0),
        ];
        let risk_score = sub_scores.iter().sum::<f64>() / sub_scores.len() as f64;

        RiskMetrics {
            exposure_percent,
            daily_pnl_percent,
            drawdown_percent,
            position_count: positions.len(),
            risk_score,
        }
    }

    pub fn risk_summary(&self, account: &AccountInfo, positions: &[Position]) -> RiskSummary {
        let metrics = self.portfolio_risk_metrics(account, positions);

        let mut alerts = Vec::new();
        if metrics.exposure_percent > self.params.max_total_exposure_percent {
            alerts.push(format!(
                "portfolio exposure {:.1}% exceeds limit",
                metrics.exposure_percent
            ));
        }
        if metrics.daily_pnl_percent < -self.params.max_daily_loss_percent {
            alerts.push(format!(
                "daily loss {:.1}% exceeds limit",
                metrics.daily_pnl_percent
            ));
        }
        if metrics.position_count > self.params.max_positions {
            alerts.push(format!(
                "position count {} exceeds limit",
                metrics.position_count
            ));
        }
        if metrics.risk_score > 0.8 {
            alerts.push("high overall risk score".to_string());
        }

        let mut recommendations = Vec::new();
        if metrics.exposure_percent > 70.0 {
            recommendations.push("consider reducing portfolio exposure".to_string());
        }
        if metrics.position_count > 15 {
            recommendations.push("consider consolidating positions".to_string());
        }
        if metrics.risk_score > 0.6 {
            recommendations.push("review risk parameters and tighten controls".to_string());
        }

        RiskSummary {
            metrics,
            parameters: self.params.clone(),
            active_rules: self.rule_names().iter().map(|n| n.to_string()).collect(),
            active_stops: self.stops.active_count(),
            alerts,
            recommendations,
        }
    }
}
