//! Position monitoring
//!
//! Periodically re-evaluates open positions against exit conditions and
//! emits exit signals for the order executor. One position failing to price
//! never aborts the scan of its siblings.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::broker::{Broker, Clock, Position, PositionSide};
use crate::config::ExitConditions;
use crate::core::{ExitReason, ExitSignal};

/// Pluggable exit predicate over a position and its current price.
///
/// Extension points for trailing-stop and indicator-based exits; an absent
/// hook never fires.
pub type ExitHook = Box<dyn Fn(&Position, f64) -> bool + Send + Sync>;

/// Informational alert, never an exit by itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionAlert {
    pub symbol: String,
    pub alert_type: AlertType,
    pub pnl_percent: f64,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    LargeLoss,
    LargeGain,
    NearStopLoss,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRow {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub market_value: f64,
    pub unrealized_pnl: f64,
    pub pnl_percent: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionSummary {
    pub total_positions: usize,
    pub long_positions: usize,
    pub short_positions: usize,
    pub total_market_value: f64,
    pub total_unrealized_pnl: f64,
    pub positions: Vec<PositionRow>,
}

pub struct PositionMonitor {
    broker: Arc<dyn Broker>,
    clock: Arc<dyn Clock>,
    conditions: ExitConditions,
    trailing_stop_hook: Option<ExitHook>,
    technical_exit_hook: Option<ExitHook>,
}

impl PositionMonitor {
    pub fn new(broker: Arc<dyn Broker>, clock: Arc<dyn Clock>, conditions: ExitConditions) -> Self {
        Self {
            broker,
            clock,
            conditions,
            trailing_stop_hook: None,
            technical_exit_hook: None,
        }
    }

    pub fn with_trailing_stop_hook(mut self, hook: ExitHook) -> Self {
        self.trailing_stop_hook = Some(hook);
        self
    }

    pub fn with_technical_exit_hook(mut self, hook: ExitHook) -> Self {
        self.technical_exit_hook = Some(hook);
        self
    }

    /// Evaluate every open position, yielding at most one exit signal each.
    ///
    /// Predicates run in fixed priority order and the first match wins:
    /// stop loss, take profit, max holding period, trailing stop,
    /// technical exit.
    pub async fn scan(&self, positions: &[Position]) -> Vec<ExitSignal> {
        let mut exits = Vec::new();

        for position in positions {
            let current_price = match self.broker.get_current_price(&position.symbol).await {
                Ok(price) => price,
                Err(e) => {
                    warn!(symbol = %position.symbol, error = %e, "price fetch failed, skipping position");
                    continue;
                }
            };

            if let Some(reason) = self.exit_reason(position, current_price) {
                info!(symbol = %position.symbol, reason = ?reason, "exit signal generated");
                exits.push(ExitSignal {
                    symbol: position.symbol.clone(),
                    reason,
                    urgency: reason.urgency(),
                    current_price,
                    entry_price: position.avg_entry_price,
                    pnl: position.pnl(current_price),
                    pnl_percent: position.pnl_percent(current_price),
                    quantity: position.quantity,
                    side: position.side,
                    timestamp: self.clock.now(),
                });
            }
        }

        debug!(
            scanned = positions.len(),
            exits = exits.len(),
            "position scan complete"
        );
        exits
    }

    fn exit_reason(&self, position: &Position, current_price: f64) -> Option<ExitReason> {
        let pnl_percent = position.pnl_percent(current_price);

        if pnl_percent <= -self.conditions.stop_loss_percent {
            return Some(ExitReason::StopLoss);
        }
        if pnl_percent >= self.conditions.take_profit_percent {
            return Some(ExitReason::TakeProfit);
        }

        let held = self.clock.now().signed_duration_since(position.entry_time);
        if held.num_days() >= self.conditions.max_holding_period_days {
            return Some(ExitReason::MaxHoldingPeriod);
        }

        if let Some(hook) = &self.trailing_stop_hook {
            if hook(position, current_price) {
                return Some(ExitReason::TrailingStop);
            }
        }
        if let Some(hook) = &self.technical_exit_hook {
            if hook(position, current_price) {
                return Some(ExitReason::TechnicalExit);
            }
        }

        None
    }

    /// Lower-stakes notification thresholds; these never trigger exits.
    pub async fn position_alerts(&self, positions: &[Position]) -> Vec<PositionAlert> {
        let mut alerts = Vec::new();

        for position in positions {
            let current_price = match self.broker.get_current_price(&position.symbol).await {
                Ok(price) => price,
                Err(e) => {
                    warn!(symbol = %position.symbol, error = %e, "price fetch failed, skipping alerts");
                    continue;
                }
            };
            let pnl_percent = position.pnl_percent(current_price);

            if pnl_percent <= -0.05 {
                alerts.push(PositionAlert {
                    symbol: position.symbol.clone(),
                    alert_type: AlertType::LargeLoss,
                    pnl_percent,
                    message: format!("{} down {:.1}%", position.symbol, pnl_percent * 100.0),
                });
            } else if pnl_percent >= 0.15 {
                alerts.push(PositionAlert {
                    symbol: position.symbol.clone(),
                    alert_type: AlertType::LargeGain,
                    pnl_percent,
                    message: format!("{} up {:.1}%", position.symbol, pnl_percent * 100.0),
                });
            }

            if (pnl_percent + self.conditions.stop_loss_percent).abs() < 0.005 {
                alerts.push(PositionAlert {
                    symbol: position.symbol.clone(),
                    alert_type: AlertType::NearStopLoss,
                    pnl_percent,
                    message: format!("{} approaching stop loss", position.symbol),
                });
            }
        }

        alerts
    }

    /// Portfolio-wide snapshot of the given positions at current prices.
    pub async fn position_summary(&self, positions: &[Position]) -> PositionSummary {
        let mut summary = PositionSummary {
            total_positions: positions.len(),
            ..PositionSummary::default()
        };

        for position in positions {
            let current_price = match self.broker.get_current_price(&position.symbol).await {
                Ok(price) => price,
                Err(e) => {
                    warn!(symbol = %position.symbol, error = %e, "price fetch failed, skipping row");
                    continue;
                }
            };

            let market_value = current_price * position.quantity.abs();
            let unrealized_pnl = position.pnl(current_price);
            match position.side {
                PositionSide::Long => summary.long_positions += 1,
                PositionSide::Short => summary.short_positions += 1,
            }
            summary.total_market_value += market_value;
            summary.total_unrealized_pnl += unrealized_pnl;
            summary.positions.push(PositionRow {
                symbol: position.symbol.clone(),
                side: position.side,
                quantity: position.quantity,
                entry_price: position.avg_entry_price,
                current_price,
                market_value,
                unrealized_pnl,
                pnl_percent: position.pnl_percent(current_price),
            });
        }

        summary
    }
}
