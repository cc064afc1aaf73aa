//! Builders for session times, settings and a wired-up monitor context

use super::{MemorySink, RecordingTransport};
use crate::config::SessionSettings;
use crate::core::{Clock, ManualClock, QuoteEntry, TradeTick};
use crate::engine::{DayTradeBudget, MonitorContext};
use crate::execution::PaperExecutor;
use crate::journal::Journal;
use crate::monitoring::MetricsRegistry;
use crate::notify::Notifier;
use crate::resilience::{KillSwitch, RetryPolicy};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Exchange-local (New York) wall time on a fixed trading day, 2025-06-03
pub fn session_time(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    chrono_tz::America::New_York
        .with_ymd_and_hms(2025, 6, 3, hour, minute, second)
        .single()
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_default()
}

/// Defaults with fast loops, suited to paused-clock tests
pub fn fast_settings() -> SessionSettings {
    SessionSettings {
        tick_interval_ms: 10,
        data_retry_ms: 10,
        config_poll_ms: 50,
        shutdown_grace_ms: 200,
        feed_retry: RetryPolicy::fixed(Duration::from_millis(100), 3),
        notify_retry: RetryPolicy::fixed(Duration::from_millis(10), 2),
        ..SessionSettings::default()
    }
}

/// A quote straddling `price` by one cent either side
pub fn quote_around(price: f64, at: DateTime<Utc>) -> QuoteEntry {
    QuoteEntry::new(price - 0.01, price + 0.01, at)
}

/// A round-lot print
pub fn round_lot(symbol: &str, price: f64, at: DateTime<Utc>) -> TradeTick {
    TradeTick::new(symbol, price, 100, at)
}

/// Everything a monitor needs, with handles kept for assertions
pub struct TestContext {
    pub ctx: MonitorContext,
    pub executor: Arc<PaperExecutor>,
    pub trades: MemorySink,
    pub ticks: MemorySink,
    pub transport: RecordingTransport,
    pub clock: ManualClock,
}

impl TestContext {
    /// Must be called inside a tokio runtime (the notifier spawns a task)
    pub fn new(day_trade_limit: u32, start: DateTime<Utc>) -> Self {
        let executor = Arc::new(PaperExecutor::new());
        let trades = MemorySink::new();
        let ticks = MemorySink::new();
        let transport = RecordingTransport::new();
        let clock = ManualClock::new(start);
        let (notifier, _) = Notifier::spawn(transport.clone(), RetryPolicy::fixed(Duration::ZERO, 1));
        let metrics = MetricsRegistry::new().unwrap_or_else(|e| panic!("metrics registry: {}", e));

        let ctx = MonitorContext {
            executor: executor.clone(),
            budget: Arc::new(DayTradeBudget::new(day_trade_limit)),
            journal: Journal::new(
                Arc::new(trades.clone()),
                Arc::new(ticks.clone()),
                chrono_tz::America::New_York,
            ),
            notifier,
            metrics,
            kill_switch: KillSwitch::new(),
            clock: Arc::new(clock.clone()) as Arc<dyn Clock>,
        };

        Self {
            ctx,
            executor,
            trades,
            ticks,
            transport,
            clock,
        }
    }
}
