//! Process-wide pattern-day-trade budget
//!
//! Check-then-consume happens under one async mutex which the entering
//! monitor holds across its buy submission. Two symbols crossing their entry
//! in the same instant therefore cannot both spend the last unit.

use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

#[derive(Debug)]
pub struct DayTradeBudget {
    limit: u32,
    used: Mutex<u32>,
}

impl DayTradeBudget {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            used: Mutex::new(0),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Acquire the budget lock
    pub async fn lock(&self) -> BudgetGuard<'_> {
        BudgetGuard {
            limit: self.limit,
            used: self.used.lock().await,
        }
    }

    /// Units spent so far
    pub async fn used(&self) -> u32 {
        *self.used.lock().await
    }

    /// Advisory check; callers that act on the answer must use [`Self::lock`]
    pub async fn is_available(&self) -> bool {
        !self.lock().await.exhausted()
    }
}

/// Exclusive access to the budget counter
pub struct BudgetGuard<'a> {
    limit: u32,
    used: MutexGuard<'a, u32>,
}

impl BudgetGuard<'_> {
    pub fn exhausted(&self) -> bool {
        *self.used >= self.limit
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(*self.used)
    }

    /// Spend one unit; only call after the order was accepted
    pub fn consume(&mut self) {
        *self.used += 1;
        info!(used = *self.used, limit = self.limit, "Day trade consumed");
    }
}
