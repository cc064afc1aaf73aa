//! Prometheus metrics for a trading session
//!
//! - Market data: tick verdicts, bars, feed reconnects
//! - Trading: orders by side, state machine transitions by tag
//! - Session: active monitors

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;
use tracing::info;

const NAMESPACE: &str = "tickguard";

/// Central registry for all session metrics
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    market: Arc<MarketDataMetrics>,
    trading: Arc<TradingMetrics>,
    session: Arc<SessionMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());

        let market = Arc::new(MarketDataMetrics::new(&registry)?);
        let trading = Arc::new(TradingMetrics::new(&registry)?);
        let session = Arc::new(SessionMetrics::new(&registry)?);

        info!("Prometheus metrics registry initialized");

        Ok(Self {
            registry,
            market,
            trading,
            session,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn market(&self) -> &MarketDataMetrics {
        &self.market
    }

    pub fn trading(&self) -> &TradingMetrics {
        &self.trading
    }

    pub fn session(&self) -> &SessionMetrics {
        &self.session
    }

    /// Prometheus text exposition of every metric
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry").finish_non_exhaustive()
    }
}

pub struct MarketDataMetrics {
    /// Trades by symbol and verdict (`accept` or reject reason)
    pub ticks_total: IntCounterVec,
    pub quotes_total: IntCounter,
    pub bars_total: IntCounter,
    pub feed_reconnects_total: IntCounter,
}

impl MarketDataMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let ticks_total = IntCounterVec::new(
            Opts::new("market_ticks_total", "Trade prints by validation verdict").namespace(NAMESPACE),
            &["symbol", "verdict"],
        )?;
        registry.register(Box::new(ticks_total.clone()))?;

        let quotes_total = IntCounter::with_opts(
            Opts::new("market_quotes_total", "Quotes received").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(quotes_total.clone()))?;

        let bars_total = IntCounter::with_opts(
            Opts::new("market_bars_total", "Bars received").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(bars_total.clone()))?;

        let feed_reconnects_total = IntCounter::with_opts(
            Opts::new("market_feed_reconnects_total", "Feed reconnection attempts")
                .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(feed_reconnects_total.clone()))?;

        Ok(Self {
            ticks_total,
            quotes_total,
            bars_total,
            feed_reconnects_total,
        })
    }
}

pub struct TradingMetrics {
    /// Orders accepted by the broker, by side
    pub orders_total: IntCounterVec,
    /// Orders the broker refused, by side
    pub order_failures_total: IntCounterVec,
    /// Trade log records by event tag
    pub transitions_total: IntCounterVec,
}

impl TradingMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let orders_total = IntCounterVec::new(
            Opts::new("trading_orders_total", "Orders accepted by the broker").namespace(NAMESPACE),
            &["side"],
        )?;
        registry.register(Box::new(orders_total.clone()))?;

        let order_failures_total = IntCounterVec::new(
            Opts::new("trading_order_failures_total", "Orders refused by the broker")
                .namespace(NAMESPACE),
            &["side"],
        )?;
        registry.register(Box::new(order_failures_total.clone()))?;

        let transitions_total = IntCounterVec::new(
            Opts::new("trading_transitions_total", "Position state transitions").namespace(NAMESPACE),
            &["tag"],
        )?;
        registry.register(Box::new(transitions_total.clone()))?;

        Ok(Self {
            orders_total,
            order_failures_total,
            transitions_total,
        })
    }
}

pub struct SessionMetrics {
    pub monitors_active: IntGauge,
    /// Monitors that ended on an error or panic
    pub monitor_failures_total: IntCounter,
    pub config_reloads_total: IntCounter,
    pub config_errors_total: IntCounter,
}

impl SessionMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let monitors_active = IntGauge::with_opts(
            Opts::new("session_monitors_active", "Symbol monitors running").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(monitors_active.clone()))?;

        let monitor_failures_total = IntCounter::with_opts(
            Opts::new("session_monitor_failures_total", "Symbol monitors ended by an error")
                .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(monitor_failures_total.clone()))?;

        let config_reloads_total = IntCounter::with_opts(
            Opts::new("session_config_reloads_total", "Symbol configuration reloads")
                .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(config_reloads_total.clone()))?;

        let config_errors_total = IntCounter::with_opts(
            Opts::new("session_config_errors_total", "Failed configuration polls")
                .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(config_errors_total.clone()))?;

        Ok(Self {
            monitors_active,
            monitor_failures_total,
            config_reloads_total,
            config_errors_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics
            .market()
            .ticks_total
            .with_label_values(&["ABCD", "odd_lot"])
            .inc();
        metrics.trading().orders_total.with_label_values(&["buy"]).inc();
        metrics.session().monitors_active.set(2);

        assert_eq!(
            metrics
                .market()
                .ticks_total
                .with_label_values(&["ABCD", "odd_lot"])
                .get(),
            1
        );
    }

    #[test]
    fn test_render_contains_families() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.trading().transitions_total.with_label_values(&["ENTRY"]).inc();
        let text = metrics.render();
        assert!(text.contains("tickguard_trading_transitions_total"));
        assert!(text.contains("tag=\"ENTRY\""));
    }

    #[test]
    fn test_registries_are_independent() {
        let a = MetricsRegistry::new().unwrap();
        let b = MetricsRegistry::new().unwrap();
        a.market().bars_total.inc();
        assert_eq!(b.market().bars_total.get(), 0);
    }
}
