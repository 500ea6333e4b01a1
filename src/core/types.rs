use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Direction of a trading opinion.
///
/// `Hold` is only ever produced by conflict resolution inside the
/// aggregator; strategies emit `Buy` or `Sell`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SignalDirection {
    Buy,
    Sell,
    Hold,
}

impl SignalDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalDirection::Buy => "buy",
            SignalDirection::Sell => "sell",
            SignalDirection::Hold => "hold",
        }
    }
}

/// One strategy's opinion on an instrument.
///
/// Signals are immutable once created; the aggregator consumes them and the
/// caller is responsible for marking the raw signals as processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: SignalDirection,
    /// How strongly the pattern is expressed, clamped to [0, 1].
    pub strength: f64,
    /// How trustworthy the strategy considers this reading, clamped to [0, 1].
    pub confidence: f64,
    /// Reference price at the time the signal was generated.
    pub price: f64,
    /// Originating strategy name.
    pub strategy: String,
    pub timestamp: DateTime<Utc>,
    /// Strategy-specific context, opaque to the pipeline.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Signal {
    pub fn new(
        symbol: impl Into<String>,
        direction: SignalDirection,
        strength: f64,
        confidence: f64,
        price: f64,
        strategy: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            direction,
            strength: strength.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
            price,
            strategy: strategy.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Method used to collapse one direction-group of signals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    WeightedAverage,
    MajorityVote,
    StrongestSignal,
    Consensus,
}

/// Combined opinion for one instrument, produced fresh each aggregation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedSignal {
    pub symbol: String,
    pub direction: SignalDirection,
    pub strength: f64,
    pub confidence: f64,
    pub price: f64,
    pub contributing_strategies: Vec<String>,
    pub total_signals: usize,
    pub method: AggregationMethod,
    pub timestamp: DateTime<Utc>,
}

impl AggregatedSignal {
    /// Combined score used for ranking and conflict resolution.
    pub fn score(&self) -> f64 {
        self.strength * self.confidence
    }

    /// Hold signals must never be forwarded to the risk manager.
    pub fn is_actionable(&self) -> bool {
        self.direction != SignalDirection::Hold
    }
}

/// Why an open position should be closed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TrailingStop,
    MaxHoldingPeriod,
    TechnicalExit,
}

/// Execution priority for an exit signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExitUrgency {
    High,
    Medium,
    Low,
}

impl ExitReason {
    /// Stop losses are urgent; time-based exits can wait for the next cycle.
    pub fn urgency(&self) -> ExitUrgency {
        match self {
            ExitReason::StopLoss => ExitUrgency::High,
            ExitReason::TakeProfit => ExitUrgency::Medium,
            ExitReason::TrailingStop => ExitUrgency::Medium,
            ExitReason::MaxHoldingPeriod => ExitUrgency::Low,
            ExitReason::TechnicalExit => ExitUrgency::Medium,
        }
    }
}

/// Instruction to close a position, consumed by the order executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitSignal {
    pub symbol: String,
    pub reason: ExitReason,
    pub urgency: ExitUrgency,
    pub current_price: f64,
    pub entry_price: f64,
    pub pnl: f64,
    pub pnl_percent: f64,
    pub quantity: f64,
    pub side: crate::broker::PositionSide,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_clamps_strength_and_confidence() {
        let s = Signal::new("AAPL", SignalDirection::Buy, 1.7, -0.2, 150.0, "momentum");
        assert_eq!(s.strength, 1.0);
        assert_eq!(s.confidence, 0.0);
    }

    #[test]
    fn hold_is_not_actionable() {
        let agg = AggregatedSignal {
            symbol: "AAPL".to_string(),
            direction: SignalDirection::Hold,
            strength: 0.5,
            confidence: 0.5,
            price: 100.0,
            contributing_strategies: vec![],
            total_signals: 2,
            method: AggregationMethod::WeightedAverage,
            timestamp: Utc::now(),
        };
        assert!(!agg.is_actionable());
    }

    #[test]
    fn exit_urgency_mapping() {
        assert_eq!(ExitReason::StopLoss.urgency(), ExitUrgency::High);
        assert_eq!(ExitReason::TakeProfit.urgency(), ExitUrgency::Medium);
        assert_eq!(ExitReason::MaxHoldingPeriod.urgency(), ExitUrgency::Low);
    }
}
