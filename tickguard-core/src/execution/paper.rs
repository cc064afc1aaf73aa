//! In-memory broker for paper sessions and tests
//!
//! Market orders fill immediately at the latest validated price (when one is
//! known). Every accepted order is kept so tests can assert on the exact
//! sequence submitted.

use super::{ExecutionError, ExecutionMode, OrderExecutor};
use crate::core::{ClosedPosition, OrderResult, Side};
use crate::data::PriceBook;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::info;

/// Order accepted by the paper broker
#[derive(Debug, Clone, PartialEq)]
pub struct PaperOrder {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: u64,
    pub fill_price: Option<f64>,
}

#[derive(Debug, Default)]
struct PaperState {
    next_id: u64,
    positions: BTreeMap<String, u64>,
    orders: Vec<PaperOrder>,
    injected_failures: VecDeque<ExecutionError>,
}

#[derive(Debug, Default)]
pub struct PaperExecutor {
    state: Mutex<PaperState>,
    prices: Option<Arc<PriceBook>>,
}

impl PaperExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill at the latest validated price from `prices`
    pub fn with_prices(prices: Arc<PriceBook>) -> Self {
        Self {
            state: Mutex::default(),
            prices: Some(prices),
        }
    }

    /// Make the next order-affecting call fail with `error`
    pub fn fail_next(&self, error: ExecutionError) {
        self.state.lock().injected_failures.push_back(error);
    }

    pub fn orders(&self) -> Vec<PaperOrder> {
        self.state.lock().orders.clone()
    }

    pub fn position(&self, symbol: &str) -> u64 {
        self.state.lock().positions.get(symbol).copied().unwrap_or(0)
    }

    /// Seed a position, e.g. one carried from an earlier session
    pub fn set_position(&self, symbol: &str, qty: u64) {
        let mut state = self.state.lock();
        if qty == 0 {
            state.positions.remove(symbol);
        } else {
            state.positions.insert(symbol.to_string(), qty);
        }
    }

    fn fill(&self, state: &mut PaperState, symbol: &str, qty: u64, side: Side) -> OrderResult {
        state.next_id += 1;
        let order = PaperOrder {
            order_id: format!("paper-{}", state.next_id),
            symbol: symbol.to_string(),
            side,
            qty,
            fill_price: self.prices.as_ref().and_then(|p| p.latest_price(symbol)),
        };
        info!(
            order_id = %order.order_id,
            symbol,
            side = %side,
            qty,
            fill_price = ?order.fill_price,
            "Paper order filled"
        );
        state.orders.push(order.clone());

        OrderResult {
            order_id: order.order_id,
            symbol: order.symbol,
            side,
            qty,
            fill_price: order.fill_price,
        }
    }

    fn apply(
        &self,
        state: &mut PaperState,
        symbol: &str,
        qty: u64,
        side: Side,
    ) -> Result<OrderResult, ExecutionError> {
        if let Some(error) = state.injected_failures.pop_front() {
            return Err(error);
        }
        if qty == 0 {
            return Err(ExecutionError::Rejected {
                symbol: symbol.to_string(),
                reason: "quantity must be positive".to_string(),
            });
        }

        match side {
            Side::Buy => {
                *state.positions.entry(symbol.to_string()).or_insert(0) += qty;
            }
            Side::Sell => {
                let held = state.positions.get(symbol).copied().unwrap_or(0);
                if held == 0 {
                    return Err(ExecutionError::NoPosition {
                        symbol: symbol.to_string(),
                    });
                }
                if qty > held {
                    return Err(ExecutionError::InsufficientPosition {
                        symbol: symbol.to_string(),
                        requested: qty,
                        held,
                    });
                }
                if held == qty {
                    state.positions.remove(symbol);
                } else {
                    state.positions.insert(symbol.to_string(), held - qty);
                }
            }
        }
        Ok(self.fill(state, symbol, qty, side))
    }
}

#[async_trait]
impl OrderExecutor for PaperExecutor {
    async fn submit_order(
        &self,
        symbol: &str,
        qty: u64,
        side: Side,
    ) -> Result<OrderResult, ExecutionError> {
        let mut state = self.state.lock();
        self.apply(&mut state, symbol, qty, side)
    }

    async fn close_position(&self, symbol: &str, qty: u64) -> Result<OrderResult, ExecutionError> {
        let mut state = self.state.lock();
        self.apply(&mut state, symbol, qty, Side::Sell)
    }

    async fn close_all_positions(&self) -> Result<Vec<ClosedPosition>, ExecutionError> {
        let mut state = self.state.lock();
        if let Some(error) = state.injected_failures.pop_front() {
            return Err(error);
        }

        let open: Vec<(String, u64)> = std::mem::take(&mut state.positions).into_iter().collect();
        let closed = open
            .into_iter()
            .map(|(symbol, qty)| {
                self.fill(&mut state, &symbol, qty, Side::Sell);
                ClosedPosition { symbol, qty }
            })
            .collect();
        Ok(closed)
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Paper
    }
}
