use super::FeedEvent;
use crate::data::TradeValidator;
use crate::indicators::IndicatorEngine;
use crate::monitoring::MetricsRegistry;
use std::sync::Arc;
use tracing::trace;

/// Fans feed events out to the validator and the indicator engine
#[derive(Clone)]
pub struct MarketRouter {
    validator: Arc<TradeValidator>,
    indicators: Arc<IndicatorEngine>,
    metrics: MetricsRegistry,
}

impl MarketRouter {
    pub fn new(
        validator: Arc<TradeValidator>,
        indicators: Arc<IndicatorEngine>,
        metrics: MetricsRegistry,
    ) -> Self {
        Self {
            validator,
            indicators,
            metrics,
        }
    }

    pub fn dispatch(&self, event: FeedEvent) {
        match event {
            FeedEvent::Quote { symbol, quote } => {
                self.validator.record_quote(&symbol, quote);
                self.metrics.market().quotes_total.inc();
            }
            FeedEvent::Trade(trade) => {
                let verdict = self.validator.on_trade(&trade);
                self.metrics
                    .market()
                    .ticks_total
                    .with_label_values(&[trade.symbol.as_str(), verdict.label()])
                    .inc();
            }
            FeedEvent::Bar { symbol, bar } => {
                let snapshot = self.indicators.on_bar(&symbol, bar);
                self.metrics.market().bars_total.inc();
                trace!(
                    symbol = %symbol,
                    rsi = snapshot.rsi,
                    macd_hist = snapshot.macd_hist,
                    bars = snapshot.bar_count,
                    "Bar applied"
                );
            }
        }
    }

    pub fn validator(&self) -> &Arc<TradeValidator> {
        &self.validator
    }

    pub fn indicators(&self) -> &Arc<IndicatorEngine> {
        &self.indicators
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Bar, QuoteEntry, TradeTick};
    use crate::data::{PriceBook, ValidationConfig};
    use crate::indicators::IndicatorConfig;
    use crate::journal::Journal;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_dispatch_reaches_every_consumer() {
        let tz = chrono_tz::America::New_York;
        let prices = Arc::new(PriceBook::new());
        let validator = Arc::new(TradeValidator::new(
            ValidationConfig::default(),
            prices.clone(),
            Journal::discard(tz),
        ));
        let indicators = Arc::new(IndicatorEngine::new(IndicatorConfig::default(), tz));
        let metrics = MetricsRegistry::new().unwrap();
        let router = MarketRouter::new(validator, indicators.clone(), metrics.clone());

        let at = Utc.with_ymd_and_hms(2025, 6, 3, 14, 0, 0).unwrap();
        router.dispatch(FeedEvent::Quote {
            symbol: "ABCD".to_string(),
            quote: QuoteEntry::new(9.99, 10.01, at),
        });
        router.dispatch(FeedEvent::Trade(TradeTick::new("ABCD", 10.00, 200, at)));
        router.dispatch(FeedEvent::Trade(TradeTick::new("ABCD", 10.00, 50, at)));
        router.dispatch(FeedEvent::Bar {
            symbol: "ABCD".to_string(),
            bar: Bar::flat(10.0, 1000.0, at),
        });

        assert_eq!(prices.latest_price("ABCD"), Some(10.00));
        assert_eq!(indicators.snapshot("ABCD").bar_count, 1);
        assert_eq!(metrics.market().quotes_total.get(), 1);
        assert_eq!(
            metrics
                .market()
                .ticks_total
                .with_label_values(&["ABCD", "odd_lot"])
                .get(),
            1
        );
    }
}
