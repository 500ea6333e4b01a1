//! Broker collaborator seam
//!
//! The pipeline depends on exactly one active broker connection through the
//! [`Broker`] trait; wire protocols live behind it. Errors split into
//! retryable connection failures and non-retryable rejections: anything the
//! broker does not explicitly classify as a rejection is treated as
//! retryable by the executor's submission loop.

pub mod clock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use clock::{Clock, SystemClock};

/// Broker-side failures.
#[derive(Error, Debug, Clone)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connection(String),

    #[error("order rejected by broker: {0}")]
    Rejected(String),
}

impl BrokerError {
    /// Rejections are final; everything else is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, BrokerError::Rejected(_))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeInForce {
    Day,
    GoodTillCancelled,
    ImmediateOrCancel,
}

/// Order lifecycle status.
///
/// `created → submitted → {filled | partially_filled → filled, cancelled,
/// rejected, timed_out}`. An order is immutable once terminal. `TimedOut`
/// is terminal for the pipeline even though the broker-side order may still
/// resolve asynchronously.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Submitted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    TimedOut,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::TimedOut
        )
    }
}

/// A unit of execution handed to the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub order_type: OrderType,
    /// Required for limit and stop-limit orders.
    pub limit_price: Option<f64>,
    /// Required for stop and stop-limit orders.
    pub stop_price: Option<f64>,
    pub time_in_force: TimeInForce,
    /// Client-assigned correlation id, set at construction.
    pub client_order_id: String,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderType::Market,
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::Day,
            client_order_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn limit(symbol: impl Into<String>, side: OrderSide, quantity: f64, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderType::Limit,
            limit_price: Some(price),
            stop_price: None,
            time_in_force: TimeInForce::Day,
            client_order_id: Uuid::new_v4().to_string(),
        }
    }

    /// Notional value implied by the order's own reference price. Market
    /// orders without a price carry no notional the rules can check.
    pub fn notional_value(&self) -> f64 {
        self.quantity * self.limit_price.or(self.stop_price).unwrap_or(0.0)
    }
}

/// Status snapshot of a broker-side order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub status: OrderStatus,
    pub filled_quantity: f64,
    pub avg_fill_price: Option<f64>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Order side that closes a position of this side.
    pub fn closing_order_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }
}

/// An open holding as reported by the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: f64,
    pub avg_entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub current_price: f64,
    pub market_value: f64,
    pub unrealized_pnl: f64,
    pub stop_loss_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    /// Best price seen since entry, tracked for trailing stops.
    pub peak_price: Option<f64>,
}

impl Position {
    /// Signed P&L fraction relative to entry; the sign flips for shorts.
    pub fn pnl_percent(&self, current_price: f64) -> f64 {
        if self.avg_entry_price <= 0.0 {
            return 0.0;
        }
        match self.side {
            PositionSide::Long => (current_price - self.avg_entry_price) / self.avg_entry_price,
            PositionSide::Short => (self.avg_entry_price - current_price) / self.avg_entry_price,
        }
    }

    /// Signed P&L in account currency.
    pub fn pnl(&self, current_price: f64) -> f64 {
        match self.side {
            PositionSide::Long => (current_price - self.avg_entry_price) * self.quantity,
            PositionSide::Short => (self.avg_entry_price - current_price) * self.quantity,
        }
    }
}

/// Account-level figures used for sizing and exposure checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub portfolio_value: f64,
    pub cash: f64,
    pub buying_power: f64,
}

/// Abstract broker connection: order routing, position and account queries.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Submit an order, returning the broker-assigned order id.
    async fn submit_order(&self, request: &OrderRequest) -> Result<String, BrokerError>;

    async fn get_order_status(&self, order_id: &str) -> Result<Order, BrokerError>;

    async fn cancel_order(&self, order_id: &str) -> Result<bool, BrokerError>;

    async fn get_positions(&self) -> Result<Vec<Position>, BrokerError>;

    async fn get_account(&self) -> Result<AccountInfo, BrokerError>;

    async fn get_current_price(&self, symbol: &str) -> Result<f64, BrokerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::TimedOut.is_terminal());
        assert!(!OrderStatus::Submitted.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
    }

    #[test]
    fn rejection_is_not_retryable() {
        assert!(BrokerError::Connection("down".into()).is_retryable());
        assert!(!BrokerError::Rejected("insufficient buying power".into()).is_retryable());
    }

    #[test]
    fn short_pnl_sign_flips() {
        let pos = Position {
            symbol: "TSLA".to_string(),
            side: PositionSide::Short,
            quantity: 10.0,
            avg_entry_price: 200.0,
            entry_time: Utc::now(),
            current_price: 180.0,
            market_value: 1800.0,
            unrealized_pnl: 0.0,
            stop_loss_price: None,
            take_profit_price: None,
            peak_price: None,
        };
        assert!(pos.pnl_percent(180.0) > 0.0);
        assert_eq!(pos.pnl(180.0), 200.0);
        assert_eq!(pos.side.closing_order_side(), OrderSide::Buy);
    }
}
