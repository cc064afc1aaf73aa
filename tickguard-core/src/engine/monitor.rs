//! Per-symbol trade state machine driver
//!
//! [`SymbolMonitor::decide`] is a pure function of the position, the
//! configuration and one tick's market view. [`SymbolMonitor::on_tick`] acts
//! on the decision: it talks to the broker, advances the position and writes
//! the trade log record before returning.
//!
//! Exit priority while holding shares:
//!
//! 1. stop-loss (`EXIT`)
//! 2. end-of-day cutoff (`EOD EXIT`)
//! 3. take-profit gates (`50% Exit`, `2nd 50% Exit`, `100% Exit`)

use super::budget::DayTradeBudget;
use super::take_profit::{ExitSize, Gate, TakeProfitInput, TakeProfitTracker};
use crate::config::{SessionSettings, SymbolConfig};
use crate::core::{Bar, Clock, Phase, PositionState, Side, TransitionError};
use crate::execution::{ExecutionError, OrderExecutor};
use crate::indicators::IndicatorSnapshot;
use crate::journal::{EventTag, Journal};
use crate::monitoring::MetricsRegistry;
use crate::notify::Notifier;
use crate::resilience::KillSwitch;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("{side} order for {symbol} failed: {source}")]
    Order {
        symbol: String,
        side: Side,
        #[source]
        source: ExecutionError,
    },
}

/// Shared collaborators handed to every monitor
#[derive(Clone)]
pub struct MonitorContext {
    pub executor: Arc<dyn OrderExecutor>,
    pub budget: Arc<DayTradeBudget>,
    pub journal: Journal,
    pub notifier: Notifier,
    pub metrics: MetricsRegistry,
    pub kill_switch: KillSwitch,
    pub clock: Arc<dyn Clock>,
}

/// One tick's view of the market for a symbol
#[derive(Debug, Clone, Copy)]
pub struct TickInput {
    pub now: DateTime<Utc>,
    /// Latest validated price
    pub price: f64,
    pub day_high: f64,
    pub indicators: IndicatorSnapshot,
    pub last_bar: Option<Bar>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Hold,
    Enter { qty: u64 },
    Exit { tag: EventTag, qty: u64, reason: ExitReason },
    /// Cutoff reached before any entry
    EndOfDay,
    /// Already closed
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    EndOfDay,
    TakeProfit(Gate),
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::EndOfDay => "end_of_day",
            ExitReason::TakeProfit(gate) => gate.as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Position fully exited
    Closed,
    /// Cutoff reached (with or without a position)
    EndOfDay,
    /// Symbol dropped from the configuration
    Removed,
    /// Session shutting down
    Shutdown,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Closed => "closed",
            FinishReason::EndOfDay => "end_of_day",
            FinishReason::Removed => "removed",
            FinishReason::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// Sleep this long (cut short by the cutoff or shutdown)
    Dormant(Duration),
    Finished(FinishReason),
}

/// State machine for one watchlist symbol
#[derive(Debug)]
pub struct SymbolMonitor {
    config: SymbolConfig,
    settings: Arc<SessionSettings>,
    position: PositionState,
    take_profit: TakeProfitTracker,
}

impl SymbolMonitor {
    pub fn new(config: SymbolConfig, settings: Arc<SessionSettings>) -> Self {
        Self {
            config,
            settings,
            position: PositionState::new(),
            take_profit: TakeProfitTracker::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    pub fn config(&self) -> &SymbolConfig {
        &self.config
    }

    pub fn position(&self) -> &PositionState {
        &self.position
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Swap in reloaded thresholds; the position itself is untouched
    pub fn update_config(&mut self, config: SymbolConfig) {
        if config != self.config {
            info!(
                symbol = %self.config.symbol,
                entry_price = config.entry_price,
                stop_loss = config.stop_loss,
                trailing_stop_percentage = config.trailing_stop_percentage,
                dollar_value = config.dollar_value,
                "Thresholds updated"
            );
            self.config = config;
        }
    }

    pub fn decide(&mut self, input: &TickInput) -> Decision {
        match self.position.phase() {
            Phase::Closed => Decision::Done,
            Phase::WaitingEntry => {
                if self.settings.is_past_eod(input.now) {
                    Decision::EndOfDay
                } else if input.price > self.config.entry_price
                    && self.settings.can_enter_at(input.now)
                {
                    Decision::Enter {
                        qty: self.config.quantity(),
                    }
                } else {
                    Decision::Hold
                }
            }
            Phase::InPosition | Phase::PartiallyExited => self.decide_exit(input),
        }
    }

    fn decide_exit(&mut self, input: &TickInput) -> Decision {
        let remaining = self.position.remaining_qty();

        if input.price < self.config.stop_loss {
            return Decision::Exit {
                tag: EventTag::Exit,
                qty: remaining,
                reason: ExitReason::StopLoss,
            };
        }
        if self.settings.is_past_eod(input.now) {
            return Decision::Exit {
                tag: EventTag::EodExit,
                qty: remaining,
                reason: ExitReason::EndOfDay,
            };
        }

        let tp_input = TakeProfitInput {
            price: input.price,
            day_high: input.day_high,
            entry_price: self.config.entry_price,
            trailing_stop_percentage: self.config.trailing_stop_percentage,
            indicators: &input.indicators,
            last_bar: input.last_bar.as_ref(),
        };
        let Some((gate, size)) = self.take_profit.evaluate(&self.settings.take_profit, &tp_input)
        else {
            return Decision::Hold;
        };

        let reason = ExitReason::TakeProfit(gate);
        let (tag, qty) = if self.position.partial_taken() {
            (EventTag::SecondHalfExit, remaining)
        } else {
            match size {
                ExitSize::Half => {
                    let half = (self.position.entry_qty() as f64 / 2.0).round() as u64;
                    if half >= remaining {
                        (EventTag::FullExit, remaining)
                    } else {
                        (EventTag::HalfExit, half)
                    }
                }
                ExitSize::Remainder => (EventTag::FullExit, remaining),
            }
        };
        Decision::Exit { tag, qty, reason }
    }

    /// Evaluate one tick and carry out the decision
    pub async fn on_tick(
        &mut self,
        input: TickInput,
        ctx: &MonitorContext,
    ) -> Result<TickOutcome, MonitorError> {
        match self.decide(&input) {
            Decision::Hold => Ok(TickOutcome::Continue),
            Decision::Done => Ok(TickOutcome::Finished(FinishReason::Closed)),
            Decision::EndOfDay => {
                self.position.abandon()?;
                info!(symbol = %self.config.symbol, "Cutoff reached without entry");
                Ok(TickOutcome::Finished(FinishReason::EndOfDay))
            }
            Decision::Enter { qty } => self.enter(qty, &input, ctx).await,
            Decision::Exit { tag, qty, reason } => self.exit(tag, qty, reason, &input, ctx).await,
        }
    }

    async fn enter(
        &mut self,
        qty: u64,
        input: &TickInput,
        ctx: &MonitorContext,
    ) -> Result<TickOutcome, MonitorError> {
        let symbol = self.config.symbol.clone();
        let mut budget = ctx.budget.lock().await;

        if ctx.kill_switch.should_stop() {
            return Ok(TickOutcome::Finished(FinishReason::Shutdown));
        }

        if budget.exhausted() {
            drop(budget);
            self.record(ctx, input.now, EventTag::Skip, qty, input.price);
            info!(
                symbol = %symbol,
                price = input.price,
                dormancy_secs = self.settings.skip_dormancy_secs,
                "Day trade budget exhausted, skipping entry"
            );
            return Ok(TickOutcome::Dormant(self.settings.skip_dormancy()));
        }

        let result = match ctx.executor.submit_order(&symbol, qty, Side::Buy).await {
            Ok(result) => result,
            Err(source) => {
                ctx.metrics
                    .trading()
                    .order_failures_total
                    .with_label_values(&[Side::Buy.as_str()])
                    .inc();
                return Err(MonitorError::Order {
                    symbol,
                    side: Side::Buy,
                    source,
                });
            }
        };
        budget.consume();
        drop(budget);

        let price = result.fill_price.unwrap_or(input.price);
        self.position.enter(qty, price)?;
        ctx.metrics
            .trading()
            .orders_total
            .with_label_values(&[Side::Buy.as_str()])
            .inc();
        self.record(ctx, input.now, EventTag::Entry, qty, price);
        info!(symbol = %symbol, qty, price, order_id = %result.order_id, "Entered position");
        Ok(TickOutcome::Continue)
    }

    async fn exit(
        &mut self,
        tag: EventTag,
        qty: u64,
        reason: ExitReason,
        input: &TickInput,
        ctx: &MonitorContext,
    ) -> Result<TickOutcome, MonitorError> {
        if ctx.kill_switch.should_stop() {
            warn!(
                symbol = %self.config.symbol,
                remaining = self.position.remaining_qty(),
                "Shutdown requested, exit not submitted"
            );
            return Ok(TickOutcome::Finished(FinishReason::Shutdown));
        }

        let result = ctx
            .executor
            .close_position(&self.config.symbol, qty)
            .await
            .map_err(|source| {
                ctx.metrics
                    .trading()
                    .order_failures_total
                    .with_label_values(&[Side::Sell.as_str()])
                    .inc();
                MonitorError::Order {
                    symbol: self.config.symbol.clone(),
                    side: Side::Sell,
                    source,
                }
            })?;

        let phase = self.position.reduce(qty)?;
        let price = result.fill_price.unwrap_or(input.price);
        ctx.metrics
            .trading()
            .orders_total
            .with_label_values(&[Side::Sell.as_str()])
            .inc();
        self.record(ctx, input.now, tag, qty, price);
        info!(
            symbol = %self.config.symbol,
            tag = tag.as_str(),
            reason = reason.as_str(),
            qty,
            price,
            remaining = self.position.remaining_qty(),
            "Exited position"
        );

        Ok(match (reason, phase) {
            (ExitReason::EndOfDay, _) => TickOutcome::Finished(FinishReason::EndOfDay),
            (_, Phase::Closed) => TickOutcome::Finished(FinishReason::Closed),
            _ => TickOutcome::Continue,
        })
    }

    fn record(&self, ctx: &MonitorContext, at: DateTime<Utc>, tag: EventTag, qty: u64, price: f64) {
        let record = ctx
            .journal
            .record_trade(at, &self.config.symbol, tag, qty, price);
        ctx.metrics
            .trading()
            .transitions_total
            .with_label_values(&[tag.as_str()])
            .inc();
        ctx.notifier.push_note(
            format!("{} {}", record.symbol, tag),
            format!("{} {} @ {}", tag, qty, price),
        );
    }
}
