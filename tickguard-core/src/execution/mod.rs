//! Order execution
//!
//! [`OrderExecutor`] is the seam to the brokerage. Market orders only; the
//! position state machine decides quantities and never tracks fills beyond
//! the broker's acknowledgement.

pub mod paper;

pub use paper::{PaperExecutor, PaperOrder};

use crate::core::{ClosedPosition, OrderResult, Side};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("order rejected for {symbol}: {reason}")]
    Rejected { symbol: String, reason: String },

    #[error("no open position in {symbol}")]
    NoPosition { symbol: String },

    #[error("cannot close {requested} {symbol}, only {held} held")]
    InsufficientPosition {
        symbol: String,
        requested: u64,
        held: u64,
    },

    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

/// Execution mode of an executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Paper,
    Live,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Paper => write!(f, "PAPER"),
            ExecutionMode::Live => write!(f, "LIVE"),
        }
    }
}

/// Brokerage capability shared by every symbol monitor
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    /// Submit a market order
    async fn submit_order(&self, symbol: &str, qty: u64, side: Side)
        -> Result<OrderResult, ExecutionError>;

    /// Sell `qty` shares of an open long position
    async fn close_position(&self, symbol: &str, qty: u64) -> Result<OrderResult, ExecutionError>;

    /// Flatten every open position, returning what was closed
    async fn close_all_positions(&self) -> Result<Vec<ClosedPosition>, ExecutionError>;

    fn execution_mode(&self) -> ExecutionMode;
}
