//! Per-symbol task loop
//!
//! Each tick the task checks for shutdown and configuration changes, reads
//! the validated price and indicator snapshot, and hands them to the
//! [`SymbolMonitor`]. Every sleep races the kill switch and the config
//! channel, so a shutdown or a removal is observed immediately, even in the
//! middle of a long dormancy.

use super::monitor::{FinishReason, MonitorContext, SymbolMonitor, TickInput, TickOutcome};
use crate::config::SymbolConfig;
use crate::data::PriceBook;
use crate::indicators::IndicatorEngine;
use crate::stream::SupervisorHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// How a monitor task ended
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorExit {
    pub symbol: String,
    pub reason: ExitKind,
    /// Shares still held when the task ended
    pub remaining_qty: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExitKind {
    Finished(FinishReason),
    Failed(String),
}

impl MonitorExit {
    pub fn is_end_of_day(&self) -> bool {
        self.reason == ExitKind::Finished(FinishReason::EndOfDay)
    }
}

pub struct MonitorTask {
    monitor: SymbolMonitor,
    config_rx: watch::Receiver<Option<SymbolConfig>>,
    prices: Arc<PriceBook>,
    indicators: Arc<IndicatorEngine>,
    feed: SupervisorHandle,
    ctx: MonitorContext,
}

impl MonitorTask {
    pub fn new(
        monitor: SymbolMonitor,
        config_rx: watch::Receiver<Option<SymbolConfig>>,
        prices: Arc<PriceBook>,
        indicators: Arc<IndicatorEngine>,
        feed: SupervisorHandle,
        ctx: MonitorContext,
    ) -> Self {
        Self {
            monitor,
            config_rx,
            prices,
            indicators,
            feed,
            ctx,
        }
    }

    pub async fn run(mut self) -> MonitorExit {
        let symbol = self.monitor.symbol().to_string();
        info!(
            symbol = %symbol,
            entry_price = self.monitor.config().entry_price,
            stop_loss = self.monitor.config().stop_loss,
            "Monitor started"
        );

        let reason = match self.drive().await {
            Ok(reason) => {
                info!(symbol = %symbol, reason = reason.as_str(), "Monitor finished");
                ExitKind::Finished(reason)
            }
            Err(e) => {
                error!(symbol = %symbol, error = %e, "Monitor failed");
                self.ctx.metrics.session().monitor_failures_total.inc();
                self.ctx
                    .notifier
                    .push_note(format!("{} monitor stopped", symbol), e.to_string());
                ExitKind::Failed(e.to_string())
            }
        };

        self.feed.unsubscribe(std::slice::from_ref(&symbol));
        MonitorExit {
            symbol,
            reason,
            remaining_qty: self.monitor.position().remaining_qty(),
        }
    }

    async fn drive(&mut self) -> Result<FinishReason, super::monitor::MonitorError> {
        loop {
            if self.ctx.kill_switch.should_stop() {
                return Ok(FinishReason::Shutdown);
            }
            if let Some(reason) = self.apply_config_update() {
                return Ok(reason);
            }

            let now = self.ctx.clock.now();
            let settings = self.monitor.settings();
            let Some(state) = self.prices.get(self.monitor.symbol()) else {
                if settings.is_past_eod(now) {
                    // Never priced; nothing was bought
                    info!(symbol = %self.monitor.symbol(), "Cutoff reached before any valid print");
                    return Ok(FinishReason::EndOfDay);
                }
                let retry = settings.data_retry();
                debug!(symbol = %self.monitor.symbol(), "No validated price yet");
                if let Some(reason) = self.sleep(retry).await {
                    return Ok(reason);
                }
                continue;
            };

            let symbol = self.monitor.symbol();
            let input = TickInput {
                now,
                price: state.latest_price,
                day_high: state.day_high,
                indicators: self.indicators.snapshot(symbol),
                last_bar: self.indicators.latest_bar(symbol),
            };

            let pause = match self.monitor.on_tick(input, &self.ctx).await? {
                TickOutcome::Finished(reason) => return Ok(reason),
                TickOutcome::Continue => self.monitor.settings().tick_interval(),
                TickOutcome::Dormant(dormancy) => {
                    let until_eod = self.monitor.settings().until_eod(self.ctx.clock.now());
                    dormancy.min(until_eod)
                }
            };
            if let Some(reason) = self.sleep(pause).await {
                return Ok(reason);
            }
        }
    }

    /// Pick up reloaded thresholds; `Some` when the symbol was removed
    fn apply_config_update(&mut self) -> Option<FinishReason> {
        match self.config_rx.has_changed() {
            Ok(false) => None,
            Ok(true) => self.apply_latest_config(),
            Err(_) => Some(self.removed()),
        }
    }

    fn apply_latest_config(&mut self) -> Option<FinishReason> {
        let update = self.config_rx.borrow_and_update().clone();
        match update {
            Some(config) => {
                self.monitor.update_config(config);
                None
            }
            None => Some(self.removed()),
        }
    }

    fn removed(&self) -> FinishReason {
        let symbol = self.monitor.symbol();
        let remaining = self.monitor.position().remaining_qty();
        if remaining > 0 {
            warn!(
                symbol = %symbol,
                remaining,
                "Symbol removed from configuration while holding shares"
            );
            self.ctx.notifier.push_note(
                format!("{} removed", symbol),
                format!("still holding {} shares", remaining),
            );
        } else {
            info!(symbol = %symbol, "Symbol removed from configuration");
        }
        FinishReason::Removed
    }

    /// Sleep for `duration`; `Some` when shutdown or removal cut it short.
    /// Threshold updates are applied without ending the sleep.
    async fn sleep(&mut self, duration: Duration) -> Option<FinishReason> {
        if duration.is_zero() {
            tokio::task::yield_now().await;
            return self.ctx.kill_switch.should_stop().then_some(FinishReason::Shutdown);
        }
        let deadline = Instant::now() + duration;
        loop {
            let config_changed = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return None,
                _ = self.ctx.kill_switch.wait() => return Some(FinishReason::Shutdown),
                changed = self.config_rx.changed() => changed.is_ok(),
            };
            if !config_changed {
                return Some(self.removed());
            }
            // `changed()` already marked the value seen
            if let Some(reason) = self.apply_latest_config() {
                return Some(reason);
            }
        }
    }
}
