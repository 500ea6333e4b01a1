//! Signal aggregation
//!
//! Collapses many per-strategy opinions about one instrument into a single
//! directional signal. Pure function of its inputs: the caller groups raw
//! signals by symbol beforehand and marks them processed afterwards.

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::AggregationConfig;
use crate::core::{AggregatedSignal, AggregationMethod, Signal, SignalDirection};

/// Intermediate result for one direction-group of signals.
#[derive(Debug, Clone)]
struct GroupAggregate {
    direction: SignalDirection,
    strength: f64,
    confidence: f64,
    price: f64,
    contributing: usize,
}

pub struct SignalAggregator {
    config: AggregationConfig,
}

impl SignalAggregator {
    pub fn new(config: AggregationConfig) -> Self {
        Self { config }
    }

    /// Aggregate all signals for one instrument into a single decision.
    ///
    /// Returns `None` when fewer than `min_strategies` distinct strategies
    /// contributed, when a method's own requirements are not met (consensus
    /// disagreement, majority tie), or when the input is empty.
    pub fn aggregate(&self, signals: &[Signal]) -> Option<AggregatedSignal> {
        let first = signals.first()?;
        let symbol = &first.symbol;

        if signals.iter().any(|s| s.symbol != *symbol) {
            warn!(symbol = %symbol, "aggregate called with mixed symbols, skipping");
            return None;
        }

        let mut strategies: Vec<&str> = signals.iter().map(|s| s.strategy.as_str()).collect();
        strategies.sort_unstable();
        strategies.dedup();

        if strategies.len() < self.config.min_strategies {
            debug!(
                symbol = %symbol,
                strategies = strategies.len(),
                min = self.config.min_strategies,
                "skipping aggregation, not enough strategies"
            );
            return None;
        }

        // Consensus inspects the whole input: any disagreement at all means
        // no result, regardless of how each direction-group would score.
        if self.config.method == AggregationMethod::Consensus {
            let resolved = self.consensus(signals)?;
            return Some(self.finish(symbol, resolved, &strategies, signals.len()));
        }

        let buys: Vec<&Signal> = signals
            .iter()
            .filter(|s| s.direction == SignalDirection::Buy)
            .collect();
        let sells: Vec<&Signal> = signals
            .iter()
            .filter(|s| s.direction == SignalDirection::Sell)
            .collect();

        let buy_group = self.aggregate_group(&buys);
        let sell_group = self.aggregate_group(&sells);

        let resolved = self.resolve(buy_group, sell_group)?;
        Some(self.finish(symbol, resolved, &strategies, signals.len()))
    }

    /// Filter out hold and weak signals, strongest combined score first.
    pub fn rank_actionable<'a>(
        &self,
        aggregated: &'a [AggregatedSignal],
        min_strength: f64,
        min_confidence: f64,
    ) -> Vec<&'a AggregatedSignal> {
        let mut actionable: Vec<&AggregatedSignal> = aggregated
            .iter()
            .filter(|a| {
                a.is_actionable() && a.strength >= min_strength && a.confidence >= min_confidence
            })
            .collect();
        actionable.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        actionable
    }

    fn aggregate_group(&self, signals: &[&Signal]) -> Option<GroupAggregate> {
        if signals.is_empty() {
            return None;
        }
        match self.config.method {
            AggregationMethod::WeightedAverage => self.weighted_average(signals),
            AggregationMethod::MajorityVote => self.majority_vote(signals),
            AggregationMethod::StrongestSignal => self.strongest_signal(signals),
            // Handled on the whole input before grouping.
            AggregationMethod::Consensus => unreachable!("consensus bypasses direction groups"),
        }
    }

    fn weighted_average(&self, signals: &[&Signal]) -> Option<GroupAggregate> {
        // Per-strategy weights default to 1.0 until a calibration source exists.
        let mut total_weight = 0.0;
        let mut weighted_strength = 0.0;
        for signal in signals {
            let weight = 1.0;
            total_weight += weight;
            weighted_strength += signal.strength * weight;
        }
        if total_weight == 0.0 {
            return None;
        }

        Some(GroupAggregate {
            direction: signals[0].direction,
            strength: weighted_strength / total_weight,
            confidence: (signals.len() as f64 / self.config.confidence_saturation).min(1.0),
            price: mean_price(signals),
            contributing: signals.len(),
        })
    }

    fn majority_vote(&self, signals: &[&Signal]) -> Option<GroupAggregate> {
        let buy_votes = signals
            .iter()
            .filter(|s| s.direction == SignalDirection::Buy)
            .count();
        let sell_votes = signals.len() - buy_votes;

        if buy_votes == sell_votes {
            // Tie, no clear majority
            return None;
        }

        let winner = if buy_votes > sell_votes {
            SignalDirection::Buy
        } else {
            SignalDirection::Sell
        };
        let winners: Vec<&Signal> = signals
            .iter()
            .filter(|s| s.direction == winner)
            .copied()
            .collect();
        let votes = winners.len();

        Some(GroupAggregate {
            direction: winner,
            strength: winners.iter().map(|s| s.strength).sum::<f64>() / votes as f64,
            confidence: votes as f64 / signals.len() as f64,
            price: mean_price(&winners),
            contributing: votes,
        })
    }

    fn strongest_signal(&self, signals: &[&Signal]) -> Option<GroupAggregate> {
        let strongest = signals.iter().max_by(|a, b| {
            a.strength
                .partial_cmp(&b.strength)
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;

        Some(GroupAggregate {
            direction: strongest.direction,
            strength: strongest.strength,
            confidence: strongest.strength,
            price: strongest.price,
            contributing: 1,
        })
    }

    fn consensus(&self, signals: &[Signal]) -> Option<GroupAggregate> {
        let direction = signals[0].direction;
        if signals.iter().any(|s| s.direction != direction) {
            debug!("no consensus across contributing signals");
            return None;
        }

        let refs: Vec<&Signal> = signals.iter().collect();
        Some(GroupAggregate {
            direction,
            strength: signals.iter().map(|s| s.strength).sum::<f64>() / signals.len() as f64,
            confidence: 1.0, // Unanimity
            price: mean_price(&refs),
            contributing: signals.len(),
        })
    }

    /// Resolve the buy-side and sell-side group results into one decision.
    fn resolve(
        &self,
        buy: Option<GroupAggregate>,
        sell: Option<GroupAggregate>,
    ) -> Option<GroupAggregate> {
        match (buy, sell) {
            (None, None) => None,
            (Some(buy), None) => Some(buy),
            (None, Some(sell)) => Some(sell),
            (Some(buy), Some(sell)) => {
                let buy_score = buy.strength * buy.confidence;
                let sell_score = sell.strength * sell.confidence;

                if buy_score > sell_score + self.config.conflict_threshold {
                    Some(buy)
                } else if sell_score > buy_score + self.config.conflict_threshold {
                    Some(sell)
                } else {
                    // Too close to call: hold rather than trade noise
                    debug!(buy_score, sell_score, "buy/sell conflict, resolving to hold");
                    Some(GroupAggregate {
                        direction: SignalDirection::Hold,
                        strength: 0.5,
                        confidence: 0.5,
                        price: (buy.price + sell.price) / 2.0,
                        contributing: buy.contributing + sell.contributing,
                    })
                }
            }
        }
    }

    fn finish(
        &self,
        symbol: &str,
        group: GroupAggregate,
        strategies: &[&str],
        total_signals: usize,
    ) -> AggregatedSignal {
        AggregatedSignal {
            symbol: symbol.to_string(),
            direction: group.direction,
            strength: group.strength,
            confidence: group.confidence,
            price: group.price,
            contributing_strategies: strategies.iter().map(|s| s.to_string()).collect(),
            total_signals,
            method: self.config.method,
            timestamp: Utc::now(),
        }
    }
}

fn mean_price(signals: &[&Signal]) -> f64 {
    let priced: Vec<f64> = signals
        .iter()
        .filter(|s| s.price > 0.0)
        .map(|s| s.price)
        .collect();
    if priced.is_empty() {
        return 0.0;
    }
    priced.iter().sum::<f64>() / priced.len() as f64
}
