//! Pluggable risk rules
//!
//! Each rule is an independent pass/fail check over a proposed order and the
//! current portfolio. Rules never short-circuit each other: the manager runs
//! every registered rule and returns the full diagnostic set, and a rule
//! that errors counts as a failure.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::broker::{AccountInfo, OrderRequest, Position};
use crate::config::RiskParameters;

/// Outcome of a single rule evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub passed: bool,
    pub reason: String,
}

impl RuleOutcome {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            passed: true,
            reason: reason.into(),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
        }
    }
}

/// An independent pass/fail constraint on a proposed trade.
pub trait RiskRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(
        &self,
        order: &OrderRequest,
        account: &AccountInfo,
        positions: &[Position],
        params: &RiskParameters,
    ) -> Result<RuleOutcome>;
}

/// Caps any single position at `max_position_size_percent` of the portfolio.
pub struct PositionSizeRule;

impl RiskRule for PositionSizeRule {
    fn name(&self) -> &'static str {
        "position_size"
    }

    fn evaluate(
        &self,
        order: &OrderRequest,
        account: &AccountInfo,
        _positions: &[Position],
        params: &RiskParameters,
    ) -> Result<RuleOutcome> {
        let order_value = order.notional_value();
        let max_value = account.portfolio_value * (params.max_position_size_percent / 100.0);

        if order_value > max_value {
            return Ok(RuleOutcome::fail(format!(
                "position size {:.2} exceeds maximum {:.2}",
                order_value, max_value
            )));
        }
        Ok(RuleOutcome::pass("position size OK"))
    }
}

/// Caps invested capital at `max_total_exposure_percent` of the portfolio.
pub struct TotalExposureRule;

impl RiskRule for TotalExposureRule {
    fn name(&self) -> &'static str {
        "total_exposure"
    }

    fn evaluate(
        &self,
        order: &OrderRequest,
        account: &AccountInfo,
        positions: &[Position],
        params: &RiskParameters,
    ) -> Result<RuleOutcome> {
        let current_exposure: f64 = positions.iter().map(|p| p.market_value).sum();
        let total_exposure = current_exposure + order.notional_value();
        let max_exposure = account.portfolio_value * (params.max_total_exposure_percent / 100.0);

        if total_exposure > max_exposure {
            return Ok(RuleOutcome::fail(format!(
                "total exposure {:.2} would exceed maximum {:.2}",
                total_exposure, max_exposure
            )));
        }
        Ok(RuleOutcome::pass("total exposure OK"))
    }
}

/// Caps the number of distinct open positions. Adding to an existing
/// position is always allowed.
pub struct MaxPositionsRule;

impl RiskRule for MaxPositionsRule {
    fn name(&self) -> &'static str {
        "max_positions"
    }

    fn evaluate(
        &self,
        order: &OrderRequest,
        _account: &AccountInfo,
        positions: &[Position],
        params: &RiskParameters,
    ) -> Result<RuleOutcome> {
        let existing = positions.iter().any(|p| p.symbol == order.symbol);

        if !existing && positions.len() >= params.max_positions {
            return Ok(RuleOutcome::fail(format!(
                "maximum positions ({}) already reached",
                params.max_positions
            )));
        }
        Ok(RuleOutcome::pass("position count OK"))
    }
}

/// Blocks new trades once today's unrealized loss breaches the daily limit.
pub struct DailyLossRule;

impl RiskRule for DailyLossRule {
    fn name(&self) -> &'static str {
        "daily_loss"
    }

    fn evaluate(
        &self,
        _order: &OrderRequest,
        account: &AccountInfo,
        positions: &[Position],
        params: &RiskParameters,
    ) -> Result<RuleOutcome> {
        if account.portfolio_value <= 0.0 {
            return Ok(RuleOutcome::fail("portfolio value is not positive"));
        }

        let daily_pnl: f64 = positions.iter().map(|p| p.unrealized_pnl).sum();
        let daily_pnl_percent = (daily_pnl / account.portfolio_value) * 100.0;
        let max_loss_percent = -params.max_daily_loss_percent.abs();

        if daily_pnl_percent < max_loss_percent {
            return Ok(RuleOutcome::fail(format!(
                "daily loss {:.2}% exceeds limit {:.2}%",
                daily_pnl_percent, max_loss_percent
            )));
        }
        Ok(RuleOutcome::pass("daily loss within limits"))
    }
}

/// Supplies daily volume figures for liquidity checks.
pub trait VolumeSource: Send + Sync {
    fn daily_volume(&self, symbol: &str) -> Result<f64>;
}

/// Requires a minimum daily volume when a market-data source is wired in;
/// passes through otherwise.
pub struct LiquidityRule {
    source: Option<Box<dyn VolumeSource>>,
}

impl LiquidityRule {
    pub fn new() -> Self {
        Self { source: None }
    }

    pub fn with_source(source: Box<dyn VolumeSource>) -> Self {
        Self {
            source: Some(source),
        }
    }
}

impl Default for LiquidityRule {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskRule for LiquidityRule {
    fn name(&self) -> &'static str {
        "liquidity"
    }

    fn evaluate(
        &self,
        order: &OrderRequest,
        _account: &AccountInfo,
        _positions: &[Position],
        params: &RiskParameters,
    ) -> Result<RuleOutcome> {
        let Some(source) = &self.source else {
            return Ok(RuleOutcome::pass("liquidity check skipped (no data source)"));
        };

        match source.daily_volume(&order.symbol) {
            Ok(volume) if volume < params.min_liquidity_volume => Ok(RuleOutcome::fail(format!(
                "daily volume {:.0} below minimum {:.0}",
                volume, params.min_liquidity_volume
            ))),
            Ok(_) => Ok(RuleOutcome::pass("liquidity OK")),
            Err(e) => {
                warn!(symbol = %order.symbol, error = %e, "could not check liquidity");
                Ok(RuleOutcome::pass("liquidity check skipped (error)"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::OrderSide;

    fn account(portfolio_value: f64) -> AccountInfo {
        AccountInfo {
            portfolio_value,
            cash: portfolio_value,
            buying_power: portfolio_value,
        }
    }

    #[test]
    fn position_size_rule_rejects_oversized_order() {
        let order = OrderRequest::limit("AAPL", OrderSide::Buy, 100.0, 100.0); // 10_000 notional
        let outcome = PositionSizeRule
            .evaluate(&order, &account(100_000.0), &[], &RiskParameters::default())
            .unwrap();
        assert!(!outcome.passed); // cap is 5% = 5_000

        let small = OrderRequest::limit("AAPL", OrderSide::Buy, 10.0, 100.0);
        let outcome = PositionSizeRule
            .evaluate(&small, &account(100_000.0), &[], &RiskParameters::default())
            .unwrap();
        assert!(outcome.passed);
    }

    #[test]
    fn max_positions_rule_allows_adding_to_existing() {
        let params = RiskParameters {
            max_positions: 1,
            ..RiskParameters::default()
        };
        let positions = vec![crate::testutil::position("AAPL", 10.0, 100.0, 100.0)];

        let add = OrderRequest::limit("AAPL", OrderSide::Buy, 1.0, 100.0);
        assert!(MaxPositionsRule
            .evaluate(&add, &account(100_000.0), &positions, &params)
            .unwrap()
            .passed);

        let new = OrderRequest::limit("TSLA", OrderSide::Buy, 1.0, 100.0);
        assert!(!MaxPositionsRule
            .evaluate(&new, &account(100_000.0), &positions, &params)
            .unwrap()
            .passed);
    }

    #[test]
    fn daily_loss_rule_blocks_after_breach() {
        let mut pos = crate::testutil::position("AAPL", 10.0, 100.0, 100.0);
        pos.unrealized_pnl = -3_000.0; // -3% of a 100k portfolio, limit is 2%

        let outcome = DailyLossRule
            .evaluate(
                &OrderRequest::market("TSLA", OrderSide::Buy, 1.0),
                &account(100_000.0),
                &[pos],
                &RiskParameters::default(),
            )
            .unwrap();
        assert!(!outcome.passed);
    }

    #[test]
    fn liquidity_rule_passes_through_without_source() {
        let outcome = LiquidityRule::new()
            .evaluate(
                &OrderRequest::market("AAPL", OrderSide::Buy, 1.0),
                &account(100_000.0),
                &[],
                &RiskParameters::default(),
            )
            .unwrap();
        assert!(outcome.passed);
    }

    #[test]
    fn liquidity_rule_uses_wired_source() {
        struct ThinMarket;
        impl VolumeSource for ThinMarket {
            fn daily_volume(&self, _symbol: &str) -> Result<f64> {
                Ok(5_000.0)
            }
        }

        let rule = LiquidityRule::with_source(Box::new(ThinMarket));
        let outcome = rule
            .evaluate(
                &OrderRequest::market("AAPL", OrderSide::Buy, 1.0),
                &account(100_000.0),
                &[],
                &RiskParameters::default(),
            )
            .unwrap();
        assert!(!outcome.passed);
    }
}
