//! Market and order types shared by every component
//!
//! Prices are plain `f64` dollars and quantities whole shares. Timestamps are
//! exchange timestamps in UTC; exchange-local wall-clock rules (cutoffs)
//! convert at the edge using the session time zone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-of-book quote retained in the per-symbol quote window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteEntry {
    pub bid: f64,
    pub ask: f64,
    pub timestamp: DateTime<Utc>,
}

impl QuoteEntry {
    pub fn new(bid: f64, ask: f64, timestamp: DateTime<Utc>) -> Self {
        Self { bid, ask, timestamp }
    }
}

/// Trade print from the feed. Not retained past validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeTick {
    pub symbol: String,
    pub price: f64,
    pub size: u64,
    pub timestamp: DateTime<Utc>,
    /// Exchange sale-condition codes, passed through to the tick log
    #[serde(default)]
    pub conditions: Vec<String>,
}

impl TradeTick {
    pub fn new(symbol: impl Into<String>, price: f64, size: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            size,
            timestamp,
            conditions: Vec::new(),
        }
    }

    pub fn with_conditions(mut self, conditions: Vec<String>) -> Self {
        self.conditions = conditions;
        self
    }
}

/// OHLCV bar with the venue-reported VWAP
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub vwap: f64,
    #[serde(default)]
    pub trade_count: u64,
    pub timestamp: DateTime<Utc>,
}

impl Bar {
    /// Flat bar at a single price, mostly useful for seeding and tests
    pub fn flat(price: f64, volume: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
            vwap: price,
            trade_count: 1,
            timestamp,
        }
    }
}

/// Bar aggregation period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Timeframe {
    #[default]
    #[serde(rename = "1Min")]
    OneMinute,
    #[serde(rename = "5Min")]
    FiveMinutes,
}

impl Timeframe {
    pub fn duration(&self) -> chrono::Duration {
        match self {
            Timeframe::OneMinute => chrono::Duration::minutes(1),
            Timeframe::FiveMinutes => chrono::Duration::minutes(5),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeframe::OneMinute => f.write_str("1Min"),
            Timeframe::FiveMinutes => f.write_str("5Min"),
        }
    }
}

/// Order side (Buy or Sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// Broker acknowledgement for a submitted or closing order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: u64,
    /// Fill price if the broker reported one synchronously
    pub fill_price: Option<f64>,
}

/// One position flattened by `close_all_positions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub symbol: String,
    pub qty: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_display() {
        assert_eq!(format!("{}", Side::Buy), "BUY");
        assert_eq!(format!("{}", Side::Sell), "SELL");
        assert_eq!(Side::Sell.as_str(), "sell");
    }

    #[test]
    fn test_trade_tick_deserializes_without_conditions() {
        let json = r#"{"symbol":"ABCD","price":10.01,"size":500,"timestamp":"2025-06-03T14:30:00Z"}"#;
        let tick: TradeTick = serde_json::from_str(json).unwrap();
        assert_eq!(tick.symbol, "ABCD");
        assert_eq!(tick.size, 500);
        assert!(tick.conditions.is_empty());
    }
}
