//! Order execution
//!
//! Submits sized orders to the broker with bounded retry, then polls order
//! status until a terminal state or the timeout budget runs out. Stateless
//! per call: history recording belongs to an external collaborator.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::broker::{Broker, BrokerError, Clock, OrderRequest, OrderStatus, OrderType, Position};
use crate::config::ExecutionConfig;

/// Failures surfaced by [`OrderExecutor::execute`].
///
/// A polling timeout is not an error: it comes back as an
/// [`OrderStatus::TimedOut`] result because the broker-side order may still
/// resolve and cancelling it is the caller's decision.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Malformed request, raised before any broker call.
    #[error("invalid order: {0}")]
    Validation(String),

    /// Non-retryable broker failure (explicit rejection).
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Every submission attempt failed with a retryable error.
    #[error("order submission failed after {attempts} attempts: {source}")]
    RetriesExhausted { attempts: u32, source: BrokerError },
}

/// Final report for one executed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub order_id: String,
    pub status: OrderStatus,
    pub requested_quantity: f64,
    pub filled_quantity: f64,
    pub avg_fill_price: Option<f64>,
}

/// Aggregate view over a batch of execution results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub total_orders: usize,
    pub filled_orders: usize,
    pub cancelled_orders: usize,
    pub timed_out_orders: usize,
    pub fill_rate: f64,
}

pub struct OrderExecutor {
    broker: Arc<dyn Broker>,
    clock: Arc<dyn Clock>,
    config: ExecutionConfig,
}

impl OrderExecutor {
    pub fn new(broker: Arc<dyn Broker>, clock: Arc<dyn Clock>, config: ExecutionConfig) -> Self {
        Self {
            broker,
            clock,
            config,
        }
    }

    /// Submit an order and monitor it to a terminal status.
    ///
    /// Submission is attempted up to `max_retries` times with a fixed delay
    /// between attempts; broker rejections are surfaced immediately without
    /// retry. After a successful submission the order is polled every
    /// `poll_interval_secs` until it is filled, cancelled or rejected, or the
    /// `order_timeout_secs` budget elapses. Orders are submitted with the
    /// configured `default_time_in_force`.
    pub async fn execute(
        &self,
        mut request: OrderRequest,
    ) -> Result<ExecutionResult, ExecutionError> {
        request.time_in_force = self.config.default_time_in_force;
        self.validate(&request)?;

        let order_id = self.submit_with_retry(&request).await?;
        self.monitor_order(&order_id, &request).await
    }

    /// Build and execute the market order that closes the full position.
    pub async fn exit_position(
        &self,
        position: &Position,
    ) -> Result<ExecutionResult, ExecutionError> {
        info!(symbol = %position.symbol, "exiting position");
        let request = OrderRequest::market(
            position.symbol.clone(),
            position.side.closing_order_side(),
            position.quantity.abs(),
        );
        self.execute(request).await
    }

    /// Single cancellation attempt; failures are logged, not retried.
    pub async fn cancel_order(&self, order_id: &str) -> bool {
        match self.broker.cancel_order(order_id).await {
            Ok(cancelled) => {
                info!(order_id, cancelled, "cancel order");
                cancelled
            }
            Err(e) => {
                error!(order_id, error = %e, "order cancellation failed");
                false
            }
        }
    }

    /// Fold a batch of results into fill-rate metrics.
    pub fn execution_metrics(results: &[ExecutionResult]) -> ExecutionMetrics {
        let total = results.len();
        let count = |status: OrderStatus| results.iter().filter(|r| r.status == status).count();
        let filled = count(OrderStatus::Filled);

        ExecutionMetrics {
            total_orders: total,
            filled_orders: filled,
            cancelled_orders: count(OrderStatus::Cancelled),
            timed_out_orders: count(OrderStatus::TimedOut),
            fill_rate: if total > 0 {
                filled as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    fn validate(&self, request: &OrderRequest) -> Result<(), ExecutionError> {
        if request.symbol.is_empty() {
            return Err(ExecutionError::Validation("missing symbol".into()));
        }
        if request.quantity <= 0.0 {
            return Err(ExecutionError::Validation(format!(
                "quantity must be positive, got {}",
                request.quantity
            )));
        }
        match request.order_type {
            OrderType::Limit | OrderType::StopLimit if request.limit_price.is_none() => {
                return Err(ExecutionError::Validation(
                    "limit order requires a limit price".into(),
                ));
            }
            _ => {}
        }
        match request.order_type {
            OrderType::Stop | OrderType::StopLimit if request.stop_price.is_none() => {
                return Err(ExecutionError::Validation(
                    "stop order requires a stop price".into(),
                ));
            }
            _ => {}
        }
        Ok(())
    }

    async fn submit_with_retry(&self, request: &OrderRequest) -> Result<String, ExecutionError> {
        let mut last_error: Option<BrokerError> = None;

        for attempt in 1..=self.config.max_retries {
            info!(
                symbol = %request.symbol,
                attempt,
                max = self.config.max_retries,
                "submitting order"
            );
            match self.broker.submit_order(request).await {
                Ok(order_id) => return Ok(order_id),
                Err(e) if !e.is_retryable() => {
                    error!(symbol = %request.symbol, error = %e, "order rejected, not retrying");
                    return Err(ExecutionError::Broker(e));
                }
                Err(e) => {
                    warn!(symbol = %request.symbol, attempt, error = %e, "submission attempt failed");
                    last_error = Some(e);
                    if attempt < self.config.max_retries {
                        self.clock
                            .sleep(Duration::from_secs(self.config.retry_delay_secs))
                            .await;
                    }
                }
            }
        }

        Err(ExecutionError::RetriesExhausted {
            attempts: self.config.max_retries,
            source: last_error
                .unwrap_or_else(|| BrokerError::Connection("no submission attempted".into())),
        })
    }

    async fn monitor_order(
        &self,
        order_id: &str,
        request: &OrderRequest,
    ) -> Result<ExecutionResult, ExecutionError> {
        let deadline =
            self.clock.now() + chrono::Duration::seconds(self.config.order_timeout_secs as i64);

        loop {
            match self.broker.get_order_status(order_id).await {
                Ok(order) if order.status.is_terminal() => {
                    info!(order_id, status = ?order.status, "order reached terminal status");
                    return Ok(ExecutionResult {
                        order_id: order_id.to_string(),
                        status: order.status,
                        requested_quantity: request.quantity,
                        filled_quantity: order.filled_quantity,
                        avg_fill_price: order.avg_fill_price,
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    // Transient status-poll failures burn budget, not the order
                    warn!(order_id, error = %e, "error checking order status");
                }
            }

            if self.clock.now() >= deadline {
                // The broker-side order may still resolve; cancellation is
                // the caller's decision.
                warn!(order_id, "order monitoring timed out");
                return Ok(ExecutionResult {
                    order_id: order_id.to_string(),
                    status: OrderStatus::TimedOut,
                    requested_quantity: request.quantity,
                    filled_quantity: 0.0,
                    avg_fill_price: None,
                });
            }

            self.clock
                .sleep(Duration::from_secs(self.config.poll_interval_secs))
                .await;
        }
    }
}
