//! Active-stop registry
//!
//! In-memory record of outstanding stop-loss watches, one per symbol, kept
//! behind a single-writer lock so the risk manager can be shared across
//! concurrently evaluated instruments. Triggers are one-shot: once a stop
//! fires it is deactivated and will not fire again for the same breach.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::broker::{OrderSide, Position};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopWatch {
    pub stop_price: f64,
    pub entry_price: f64,
    pub side: OrderSide,
    pub set_at: DateTime<Utc>,
    pub active: bool,
}

#[derive(Debug, Default)]
pub struct StopRegistry {
    stops: RwLock<HashMap<String, StopWatch>>,
}

impl StopRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the stop watch for a symbol.
    pub fn set(&self, symbol: &str, stop_price: f64, entry_price: f64, side: OrderSide) {
        let mut stops = self.stops.write().expect("stop registry lock poisoned");
        stops.insert(
            symbol.to_string(),
            StopWatch {
                stop_price,
                entry_price,
                side,
                set_at: Utc::now(),
                active: true,
            },
        );
        info!(symbol, stop_price, "set stop loss");
    }

    pub fn get(&self, symbol: &str) -> Option<StopWatch> {
        let stops = self.stops.read().expect("stop registry lock poisoned");
        stops.get(symbol).cloned()
    }

    /// Symbols whose current price has crossed their stop.
    ///
    /// Each triggered watch is flipped inactive before being reported, so a
    /// second call with the same still-breached prices reports nothing.
    pub fn check(&self, positions: &[Position]) -> Vec<String> {
        let mut stops = self.stops.write().expect("stop registry lock poisoned");
        let mut triggered = Vec::new();

        for position in positions {
            let Some(watch) = stops.get_mut(&position.symbol) else {
                continue;
            };
            if !watch.active {
                continue;
            }

            let breached = match watch.side {
                OrderSide::Buy => position.current_price <= watch.stop_price,
                OrderSide::Sell => position.current_price >= watch.stop_price,
            };

            if breached {
                watch.active = false;
                warn!(
                    symbol = %position.symbol,
                    current_price = position.current_price,
                    stop_price = watch.stop_price,
                    "stop loss triggered"
                );
                triggered.push(position.symbol.clone());
            }
        }

        triggered
    }

    /// Drop the watch for a symbol entirely, e.g. after the position closes.
    pub fn clear(&self, symbol: &str) {
        let mut stops = self.stops.write().expect("stop registry lock poisoned");
        stops.remove(symbol);
    }

    pub fn active_count(&self) -> usize {
        let stops = self.stops.read().expect("stop registry lock poisoned");
        stops.values().filter(|s| s.active).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::position;

    #[test]
    fn long_stop_triggers_once() {
        let registry = StopRegistry::new();
        registry.set("AAPL", 95.0, 100.0, OrderSide::Buy);

        let positions = vec![position("AAPL", 10.0, 100.0, 94.0)];
        assert_eq!(registry.check(&positions), vec!["AAPL".to_string()]);

        // Same breached price again: one-shot, nothing reported
        assert!(registry.check(&positions).is_empty());
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn short_stop_triggers_above_price() {
        let registry = StopRegistry::new();
        registry.set("TSLA", 105.0, 100.0, OrderSide::Sell);

        let safe = vec![position("TSLA", 10.0, 100.0, 101.0)];
        assert!(registry.check(&safe).is_empty());

        let breached = vec![position("TSLA", 10.0, 100.0, 106.0)];
        assert_eq!(registry.check(&breached), vec!["TSLA".to_string()]);
    }

    #[test]
    fn untracked_symbols_are_ignored() {
        let registry = StopRegistry::new();
        registry.set("AAPL", 95.0, 100.0, OrderSide::Buy);

        let positions = vec![position("MSFT", 10.0, 300.0, 10.0)];
        assert!(registry.check(&positions).is_empty());
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn clear_removes_watch() {
        let registry = StopRegistry::new();
        registry.set("AAPL", 95.0, 100.0, OrderSide::Buy);
        registry.clear("AAPL");
        assert!(registry.get("AAPL").is_none());
        assert_eq!(registry.active_count(), 0);
    }
}
