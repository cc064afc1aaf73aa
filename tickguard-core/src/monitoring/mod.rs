//! Monitoring and observability
//!
//! Prometheus counters owned by the session; rendered to the log when the
//! session ends.

pub mod metrics;

pub use metrics::{MarketDataMetrics, MetricsRegistry, SessionMetrics, TradingMetrics};
