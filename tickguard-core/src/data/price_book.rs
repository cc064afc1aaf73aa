//! Validated price state shared between the validator and the monitors
//!
//! Only accepted trades reach the book. Readers get a copy of the entry, so a
//! monitor never holds a lock while it awaits an order.

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;

/// Latest trustworthy print and session high for one symbol
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceState {
    pub latest_price: f64,
    /// Non-decreasing within `session_date`
    pub day_high: f64,
    pub updated_at: DateTime<Utc>,
    /// Exchange-local date the high belongs to
    pub session_date: NaiveDate,
}

#[derive(Debug, Default)]
pub struct PriceBook {
    prices: DashMap<String, PriceState>,
}

impl PriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted trade
    ///
    /// A print from a later session date starts a fresh day high.
    pub fn record(
        &self,
        symbol: &str,
        price: f64,
        at: DateTime<Utc>,
        session_date: NaiveDate,
    ) -> PriceState {
        let mut entry = self
            .prices
            .entry(symbol.to_string())
            .or_insert(PriceState {
                latest_price: price,
                day_high: price,
                updated_at: at,
                session_date,
            });

        let state = entry.value_mut();
        if session_date > state.session_date {
            state.day_high = price;
            state.session_date = session_date;
        } else if price > state.day_high {
            state.day_high = price;
        }
        state.latest_price = price;
        state.updated_at = at;
        *state
    }

    pub fn get(&self, symbol: &str) -> Option<PriceState> {
        self.prices.get(symbol).map(|entry| *entry.value())
    }

    pub fn latest_price(&self, symbol: &str) -> Option<f64> {
        self.get(symbol).map(|state| state.latest_price)
    }

    pub fn day_high(&self, symbol: &str) -> Option<f64> {
        self.get(symbol).map(|state| state.day_high)
    }

    /// Copy of every symbol's state
    pub fn snapshot(&self) -> Vec<(String, PriceState)> {
        self.prices
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Forget every symbol's day high and last price
    pub fn reset_day(&self) {
        self.prices.clear();
    }

    pub fn remove(&self, symbol: &str) {
        self.prices.remove(symbol);
    }
}
