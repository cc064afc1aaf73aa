//! Ghost-print filter
//!
//! Every trade is checked against the quote closest to it in time. Rules run
//! in a fixed order and the first failure wins:
//!
//! 1. `no_quotes`   - the symbol has no quotes yet
//! 2. `stale_quote` - the closest quote is more than `max_quote_age_ms` away
//! 3. `price_band`  - the print lies outside the quote band
//! 4. `odd_lot`     - fewer than `min_lot` shares
//!
//! Accepted trades update the shared [`PriceBook`]; rejected ones leave it
//! untouched. Both outcomes go to the tick log.

use super::price_book::PriceBook;
use super::quote_window::{QuoteWindow, DEFAULT_QUOTE_WINDOW};
use crate::core::{QuoteEntry, TradeTick};
use crate::journal::{Journal, TickRecord};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// How the accepted band is derived from the closest quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PriceBandMode {
    /// `bid*(1-tol) <= price <= ask*(1+tol)`
    #[default]
    Bilateral,
    /// `bid*(1-tol) <= price <= ask*(1-tol)`, tighter above the ask
    Discounted,
}

/// Validation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Fractional tolerance around the quote (0.02 = 2%)
    pub price_tolerance: f64,
    /// Maximum gap between a trade and its closest quote
    pub max_quote_age_ms: u64,
    /// Smallest round lot
    pub min_lot: u64,
    /// Quotes retained per symbol
    pub quote_window: usize,
    pub band_mode: PriceBandMode,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            price_tolerance: 0.02,
            max_quote_age_ms: 1_000,
            min_lot: 100,
            quote_window: DEFAULT_QUOTE_WINDOW,
            band_mode: PriceBandMode::Bilateral,
        }
    }
}

impl ValidationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..1.0).contains(&self.price_tolerance) {
            return Err(format!(
                "price_tolerance must be within [0, 1), got {}",
                self.price_tolerance
            ));
        }
        if self.quote_window == 0 {
            return Err("quote_window must be positive".to_string());
        }
        Ok(())
    }

    /// Inclusive `(low, high)` band for a quote
    pub fn band(&self, quote: &QuoteEntry) -> (f64, f64) {
        let tol = self.price_tolerance;
        let low = quote.bid * (1.0 - tol);
        let high = match self.band_mode {
            PriceBandMode::Bilateral => quote.ask * (1.0 + tol),
            PriceBandMode::Discounted => quote.ask * (1.0 - tol),
        };
        (low, high)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    NoQuotes,
    StaleQuote,
    PriceBand,
    OddLot,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NoQuotes => "no_quotes",
            RejectReason::StaleQuote => "stale_quote",
            RejectReason::PriceBand => "price_band",
            RejectReason::OddLot => "odd_lot",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Accept(f64),
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept(_))
    }

    /// Metric label: `accept` or the reject reason
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Accept(_) => "accept",
            Verdict::Reject(reason) => reason.as_str(),
        }
    }
}

/// Classify one trade against a quote window
pub fn classify(trade: &TradeTick, window: &QuoteWindow, config: &ValidationConfig) -> Verdict {
    let Some((quote, gap)) = window.closest(trade.timestamp) else {
        return Verdict::Reject(RejectReason::NoQuotes);
    };

    if gap > chrono::Duration::milliseconds(config.max_quote_age_ms as i64) {
        return Verdict::Reject(RejectReason::StaleQuote);
    }

    let (low, high) = config.band(quote);
    if trade.price < low || trade.price > high {
        return Verdict::Reject(RejectReason::PriceBand);
    }

    if trade.size < config.min_lot {
        return Verdict::Reject(RejectReason::OddLot);
    }

    Verdict::Accept(trade.price)
}

/// Per-symbol quote windows plus the shared price book they feed
pub struct TradeValidator {
    config: ValidationConfig,
    windows: DashMap<String, QuoteWindow>,
    prices: Arc<PriceBook>,
    journal: Journal,
}

impl TradeValidator {
    pub fn new(config: ValidationConfig, prices: Arc<PriceBook>, journal: Journal) -> Self {
        Self {
            config,
            windows: DashMap::new(),
            prices,
            journal,
        }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn prices(&self) -> &Arc<PriceBook> {
        &self.prices
    }

    pub fn record_quote(&self, symbol: &str, quote: QuoteEntry) {
        self.windows
            .entry(symbol.to_string())
            .or_insert_with(|| QuoteWindow::new(self.config.quote_window))
            .push(quote);
    }

    /// Classify a trade, update the price book on accept, and log the tick
    pub fn on_trade(&self, trade: &TradeTick) -> Verdict {
        let verdict = match self.windows.get(&trade.symbol) {
            Some(window) => classify(trade, &window, &self.config),
            None => Verdict::Reject(RejectReason::NoQuotes),
        };

        match verdict {
            Verdict::Accept(price) => {
                let session_date = trade.timestamp.with_timezone(&self.journal.tz()).date_naive();
                self.prices
                    .record(&trade.symbol, price, trade.timestamp, session_date);
            }
            Verdict::Reject(reason) => {
                debug!(
                    symbol = %trade.symbol,
                    price = trade.price,
                    size = trade.size,
                    reason = reason.as_str(),
                    "Rejected trade"
                );
            }
        }

        self.journal.record_tick(&TickRecord {
            timestamp: trade
                .timestamp
                .with_timezone(&self.journal.tz())
                .fixed_offset(),
            symbol: &trade.symbol,
            price: trade.price,
            size: trade.size,
            conditions: &trade.conditions,
            verdict,
        });

        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_748_957_400_000 + ms).unwrap()
    }

    fn window(bid: f64, ask: f64, at: DateTime<Utc>) -> QuoteWindow {
        QuoteWindow::from_quotes(500, [QuoteEntry::new(bid, ask, at)])
    }

    #[test]
    fn test_accepts_print_inside_spread() {
        let trade = TradeTick::new("ABCD", 10.01, 500, t(0));
        let verdict = classify(&trade, &window(10.00, 10.02, t(0)), &ValidationConfig::default());
        assert_eq!(verdict, Verdict::Accept(10.01));
    }

    #[test]
    fn test_rule_order_first_failure_wins() {
        let config = ValidationConfig::default();

        // Stale and out of band and odd lot: stale wins
        let trade = TradeTick::new("ABCD", 50.0, 1, t(5_000));
        assert_eq!(
            classify(&trade, &window(10.00, 10.02, t(0)), &config),
            Verdict::Reject(RejectReason::StaleQuote)
        );

        // Out of band and odd lot: band wins
        let trade = TradeTick::new("ABCD", 50.0, 1, t(0));
        assert_eq!(
            classify(&trade, &window(10.00, 10.02, t(0)), &config),
            Verdict::Reject(RejectReason::PriceBand)
        );
    }

    #[test]
    fn test_stale_boundary_is_inclusive() {
        let config = ValidationConfig::default();
        let quotes = window(10.00, 10.02, t(0));

        let trade = TradeTick::new("ABCD", 10.01, 100, t(1_000));
        assert!(classify(&trade, &quotes, &config).is_accept());

        let trade = TradeTick::new("ABCD", 10.01, 100, t(1_001));
        assert_eq!(
            classify(&trade, &quotes, &config),
            Verdict::Reject(RejectReason::StaleQuote)
        );
    }

    #[test]
    fn test_band_modes_differ_above_the_ask() {
        let quotes = window(10.00, 10.02, t(0));
        let trade = TradeTick::new("ABCD", 10.10, 100, t(0));

        let bilateral = ValidationConfig::default();
        assert!(classify(&trade, &quotes, &bilateral).is_accept());

        let discounted = ValidationConfig {
            band_mode: PriceBandMode::Discounted,
            ..ValidationConfig::default()
        };
        assert_eq!(
            classify(&trade, &quotes, &discounted),
            Verdict::Reject(RejectReason::PriceBand)
        );
    }

    #[test]
    fn test_band_below_bid() {
        let quotes = window(10.00, 10.02, t(0));
        let config = ValidationConfig::default();

        let trade = TradeTick::new("ABCD", 9.81, 100, t(0));
        assert!(classify(&trade, &quotes, &config).is_accept());

        let trade = TradeTick::new("ABCD", 9.79, 100, t(0));
        assert_eq!(
            classify(&trade, &quotes, &config),
            Verdict::Reject(RejectReason::PriceBand)
        );
    }

    #[test]
    fn test_validator_updates_prices_only_on_accept() {
        let prices = Arc::new(PriceBook::new());
        let validator = TradeValidator::new(
            ValidationConfig::default(),
            prices.clone(),
            Journal::discard(chrono_tz::America::New_York),
        );

        assert_eq!(
            validator.on_trade(&TradeTick::new("ABCD", 10.01, 500, t(0))),
            Verdict::Reject(RejectReason::NoQuotes)
        );
        assert_eq!(prices.latest_price("ABCD"), None);

        validator.record_quote("ABCD", QuoteEntry::new(10.00, 10.02, t(0)));
        validator.on_trade(&TradeTick::new("ABCD", 10.01, 500, t(0)));
        validator.on_trade(&TradeTick::new("ABCD", 10.02, 50, t(0)));

        assert_eq!(prices.latest_price("ABCD"), Some(10.01));
        assert_eq!(prices.day_high("ABCD"), Some(10.01));
    }

    #[test]
    fn test_config_validation() {
        assert!(ValidationConfig::default().validate().is_ok());
        let bad = ValidationConfig {
            price_tolerance: 1.5,
            ..ValidationConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    proptest! {
        #[test]
        fn prop_empty_window_always_no_quotes(price in 0.0f64..10_000.0, size in 0u64..100_000) {
            let trade = TradeTick::new("ABCD", price, size, t(0));
            prop_assert_eq!(
                classify(&trade, &QuoteWindow::default(), &ValidationConfig::default()),
                Verdict::Reject(RejectReason::NoQuotes)
            );
        }

        #[test]
        fn prop_odd_lot_always_rejected(
            bid in 1.0f64..500.0,
            spread in 0.0f64..0.05,
            frac in 0.0f64..=1.0,
            size in 0u64..100,
            offset_ms in -1_000i64..=1_000,
        ) {
            let ask = bid * (1.0 + spread);
            let price = bid + (ask - bid) * frac;
            let trade = TradeTick::new("ABCD", price, size, t(offset_ms));
            prop_assert_eq!(
                classify(&trade, &window(bid, ask, t(0)), &ValidationConfig::default()),
                Verdict::Reject(RejectReason::OddLot)
            );
        }
    }
}
