// Core domain types
pub mod core;

// Pipeline stages
pub mod aggregator;
pub mod executor;
pub mod monitor;
pub mod risk;

// Collaborator seams and configuration
pub mod broker;
pub mod config;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export commonly used types for convenience
pub use aggregator::SignalAggregator;
pub use broker::{Broker, BrokerError, Clock, SystemClock};
pub use config::Config;
pub use crate::core::{AggregatedSignal, ExitSignal, Signal, SignalDirection};
pub use executor::{ExecutionError, ExecutionResult, OrderExecutor};
pub use monitor::PositionMonitor;
pub use risk::{RiskDecision, RiskManager};
