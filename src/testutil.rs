//! Shared test doubles: a scriptable broker and a manual clock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::broker::{
    AccountInfo, Broker, BrokerError, Clock, Order, OrderRequest, OrderSide, OrderStatus,
    Position, PositionSide, TimeInForce,
};
use crate::core::{AggregatedSignal, AggregationMethod, SignalDirection};

/// Install a log subscriber so warn/error paths under test emit output.
/// Idempotent: only the first caller's subscriber takes effect.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

pub(crate) fn account(portfolio_value: f64) -> AccountInfo {
    AccountInfo {
        portfolio_value,
        cash: portfolio_value,
        buying_power: portfolio_value,
    }
}

pub(crate) fn position(symbol: &str, quantity: f64, entry: f64, current: f64) -> Position {
    Position {
        symbol: symbol.to_string(),
        side: PositionSide::Long,
        quantity,
        avg_entry_price: entry,
        entry_time: Utc::now(),
        current_price: current,
        market_value: quantity * current,
        unrealized_pnl: (current - entry) * quantity,
        stop_loss_price: None,
        take_profit_price: None,
        peak_price: None,
    }
}

pub(crate) fn buy_signal(
    symbol: &str,
    strength: f64,
    confidence: f64,
    price: f64,
) -> AggregatedSignal {
    AggregatedSignal {
        symbol: symbol.to_string(),
        direction: SignalDirection::Buy,
        strength,
        confidence,
        price,
        contributing_strategies: vec!["momentum".to_string(), "breakout".to_string()],
        total_signals: 2,
        method: AggregationMethod::WeightedAverage,
        timestamp: Utc::now(),
    }
}

/// Clock whose sleeps return immediately and advance `now` by the slept
/// duration, so timeout budgets elapse without real delay.
pub(crate) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    slept: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub(crate) fn new() -> Self {
        Self {
            now: Mutex::new(Utc::now()),
            slept: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap();
        *now = *now + chrono::Duration::from_std(duration).unwrap();
        self.slept.lock().unwrap().push(duration);
    }
}

/// Scriptable broker: fails the first N submissions, fills (or never fills)
/// after a set number of status polls, and serves prices from a map.
pub(crate) struct MockBroker {
    pub(crate) submissions: AtomicU32,
    pub(crate) status_polls: AtomicU32,
    pub(crate) cancels: AtomicU32,
    submit_failures: u32,
    reject_submissions: bool,
    /// `None` means the order never reaches a terminal status.
    fill_after_polls: Option<u32>,
    cancel_ok: bool,
    prices: RwLock<HashMap<String, f64>>,
    positions: RwLock<Vec<Position>>,
    last_time_in_force: Mutex<Option<TimeInForce>>,
}

impl MockBroker {
    pub(crate) fn new() -> Self {
        Self {
            submissions: AtomicU32::new(0),
            status_polls: AtomicU32::new(0),
            cancels: AtomicU32::new(0),
            submit_failures: 0,
            reject_submissions: false,
            fill_after_polls: Some(1),
            cancel_ok: true,
            prices: RwLock::new(HashMap::new()),
            positions: RwLock::new(Vec::new()),
            last_time_in_force: Mutex::new(None),
        }
    }

    pub(crate) fn last_time_in_force(&self) -> Option<TimeInForce> {
        *self.last_time_in_force.lock().unwrap()
    }

    pub(crate) fn failing_submissions(mut self, failures: u32) -> Self {
        self.submit_failures = failures;
        self
    }

    pub(crate) fn rejecting(mut self) -> Self {
        self.reject_submissions = true;
        self
    }

    pub(crate) fn never_filling(mut self) -> Self {
        self.fill_after_polls = None;
        self
    }

    pub(crate) fn filling_after(mut self, polls: u32) -> Self {
        self.fill_after_polls = Some(polls);
        self
    }

    pub(crate) fn cancel_failing(mut self) -> Self {
        self.cancel_ok = false;
        self
    }

    pub(crate) fn with_price(self, symbol: &str, price: f64) -> Self {
        self.prices
            .write()
            .unwrap()
            .insert(symbol.to_string(), price);
        self
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn submit_order(&self, request: &OrderRequest) -> Result<String, BrokerError> {
        let attempt = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_time_in_force.lock().unwrap() = Some(request.time_in_force);
        if self.reject_submissions {
            return Err(BrokerError::Rejected("insufficient buying power".into()));
        }
        if attempt <= self.submit_failures {
            return Err(BrokerError::Connection("broker unreachable".into()));
        }
        Ok(format!("order-{}", request.client_order_id))
    }

    async fn get_order_status(&self, order_id: &str) -> Result<Order, BrokerError> {
        let polls = self.status_polls.fetch_add(1, Ordering::SeqCst) + 1;
        let filled = matches!(self.fill_after_polls, Some(n) if polls >= n);

        Ok(Order {
            order_id: order_id.to_string(),
            symbol: "AAPL".to_string(),
            side: OrderSide::Buy,
            quantity: 10.0,
            status: if filled {
                OrderStatus::Filled
            } else {
                OrderStatus::Submitted
            },
            filled_quantity: if filled { 10.0 } else { 0.0 },
            avg_fill_price: if filled { Some(100.5) } else { None },
            submitted_at: Some(Utc::now()),
            completed_at: filled.then(Utc::now),
        })
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<bool, BrokerError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        if self.cancel_ok {
            Ok(true)
        } else {
            Err(BrokerError::Connection("broker unreachable".into()))
        }
    }

    async fn get_positions(&self) -> Result<Vec<Position>, BrokerError> {
        Ok(self.positions.read().unwrap().clone())
    }

    async fn get_account(&self) -> Result<AccountInfo, BrokerError> {
        Ok(account(100_000.0))
    }

    async fn get_current_price(&self, symbol: &str) -> Result<f64, BrokerError> {
        self.prices
            .read()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| BrokerError::Connection(format!("no quote for {symbol}")))
    }
}
