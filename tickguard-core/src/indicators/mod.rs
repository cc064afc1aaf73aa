//! Rolling bar window and derived indicators per symbol
//!
//! Each new bar is appended to a bounded window and the snapshot is
//! recomputed from the whole window. A zero field in [`IndicatorSnapshot`]
//! means the indicator does not have enough bars yet.

pub mod ema;
pub mod macd;
pub mod rsi;

pub use ema::{ema_series, Ema};
pub use macd::{macd, Macd, MacdValue};
pub use rsi::{rsi, Rsi};

use crate::core::{Bar, RingBuffer, Timeframe};
use chrono_tz::Tz;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const MIN_BAR_WINDOW: usize = 20;
pub const MAX_BAR_WINDOW: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    /// Bars retained per symbol (20..=200)
    pub bar_window: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    /// History requested per symbol at startup
    pub seed_lookback_minutes: i64,
    pub timeframe: Timeframe,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            bar_window: MAX_BAR_WINDOW,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            seed_lookback_minutes: 390,
            timeframe: Timeframe::OneMinute,
        }
    }
}

impl IndicatorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_BAR_WINDOW..=MAX_BAR_WINDOW).contains(&self.bar_window) {
            return Err(format!(
                "bar_window must be within {}..={}, got {}",
                MIN_BAR_WINDOW, MAX_BAR_WINDOW, self.bar_window
            ));
        }
        if self.rsi_period == 0 || self.macd_fast == 0 || self.macd_signal == 0 {
            return Err("indicator periods must be positive".to_string());
        }
        if self.macd_fast >= self.macd_slow {
            return Err(format!(
                "macd_fast ({}) must be shorter than macd_slow ({})",
                self.macd_fast, self.macd_slow
            ));
        }
        let needed = macd::min_bars(self.macd_slow, self.macd_signal);
        if self.bar_window < needed {
            return Err(format!(
                "bar_window {} cannot hold the {} bars MACD needs",
                self.bar_window, needed
            ));
        }
        if self.bar_window <= self.rsi_period {
            return Err(format!(
                "bar_window {} cannot hold the {} bars RSI needs",
                self.bar_window,
                self.rsi_period + 1
            ));
        }
        if self.seed_lookback_minutes < 0 {
            return Err("seed_lookback_minutes must not be negative".to_string());
        }
        Ok(())
    }
}

/// Indicator values for one symbol; zero means "not ready"
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IndicatorSnapshot {
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_hist: f64,
    pub session_vwap: f64,
    pub bar_count: usize,
}

impl IndicatorSnapshot {
    pub fn macd_ready(&self) -> bool {
        self.macd_signal != 0.0
    }
}

#[derive(Debug)]
struct SymbolSeries {
    bars: RingBuffer<Bar>,
    snapshot: IndicatorSnapshot,
}

/// Bar windows and snapshots for every subscribed symbol
#[derive(Debug)]
pub struct IndicatorEngine {
    config: IndicatorConfig,
    tz: Tz,
    series: DashMap<String, SymbolSeries>,
}

impl IndicatorEngine {
    pub fn new(config: IndicatorConfig, tz: Tz) -> Self {
        Self {
            config,
            tz,
            series: DashMap::new(),
        }
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    /// Append a bar and recompute the symbol's snapshot
    ///
    /// A bar with the same timestamp as the latest one replaces it; an older
    /// bar is ignored.
    pub fn on_bar(&self, symbol: &str, bar: Bar) -> IndicatorSnapshot {
        let mut entry = self
            .series
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolSeries {
                bars: RingBuffer::new(self.config.bar_window),
                snapshot: IndicatorSnapshot::default(),
            });
        let series = entry.value_mut();

        match series.bars.latest().map(|latest| latest.timestamp) {
            Some(ts) if bar.timestamp == ts => {
                if let Some(latest) = series.bars.latest_mut() {
                    *latest = bar;
                }
            }
            Some(ts) if bar.timestamp < ts => {
                debug!(symbol, bar_ts = %bar.timestamp, "Ignoring out-of-order bar");
                return series.snapshot;
            }
            _ => {
                series.bars.push(bar);
            }
        }

        series.snapshot = self.compute(&series.bars);
        series.snapshot
    }

    /// Pre-fill a symbol's window from history
    pub fn seed(&self, symbol: &str, bars: impl IntoIterator<Item = Bar>) -> IndicatorSnapshot {
        let mut window = RingBuffer::new(self.config.bar_window);
        let mut sorted: Vec<Bar> = bars.into_iter().collect();
        sorted.sort_by_key(|bar| bar.timestamp);
        sorted.dedup_by_key(|bar| bar.timestamp);
        for bar in sorted {
            window.push(bar);
        }

        let snapshot = self.compute(&window);
        self.series.insert(
            symbol.to_string(),
            SymbolSeries {
                bars: window,
                snapshot,
            },
        );
        snapshot
    }

    pub fn snapshot(&self, symbol: &str) -> IndicatorSnapshot {
        self.series
            .get(symbol)
            .map(|series| series.snapshot)
            .unwrap_or_default()
    }

    pub fn latest_bar(&self, symbol: &str) -> Option<Bar> {
        self.series
            .get(symbol)
            .and_then(|series| series.bars.latest().copied())
    }

    fn compute(&self, bars: &RingBuffer<Bar>) -> IndicatorSnapshot {
        let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
        let mut snapshot = IndicatorSnapshot {
            bar_count: closes.len(),
            session_vwap: self.session_vwap(bars),
            ..IndicatorSnapshot::default()
        };

        if let Some(value) = rsi(&closes, self.config.rsi_period) {
            snapshot.rsi = value;
        }
        if let Some(value) = macd(
            &closes,
            self.config.macd_fast,
            self.config.macd_slow,
            self.config.macd_signal,
        ) {
            snapshot.macd = value.macd;
            snapshot.macd_signal = value.signal;
            snapshot.macd_hist = value.histogram;
        }
        snapshot
    }

    /// Volume-weighted bar VWAP over the latest bar's exchange date
    fn session_vwap(&self, bars: &RingBuffer<Bar>) -> f64 {
        let Some(latest) = bars.latest() else {
            return 0.0;
        };
        let session = latest.timestamp.with_timezone(&self.tz).date_naive();

        let (notional, volume) = bars
            .iter()
            .rev()
            .take_while(|bar| bar.timestamp.with_timezone(&self.tz).date_naive() == session)
            .fold((0.0, 0.0), |(notional, volume), bar| {
                (notional + bar.vwap * bar.volume, volume + bar.volume)
            });

        if volume > 0.0 {
            notional / volume
        } else {
            0.0
        }
    }
}
