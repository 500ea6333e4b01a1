//! Core domain types shared across the pipeline

pub mod types;

pub use types::{
    AggregatedSignal, AggregationMethod, ExitReason, ExitSignal, ExitUrgency, Signal,
    SignalDirection,
};
