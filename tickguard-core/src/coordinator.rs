//! Session coordinator
//!
//! Wires the shared state together and owns every task of a trading
//! session:
//!
//! - the feed supervisor (one task)
//! - one [`MonitorTask`] per configured symbol (a `JoinSet`)
//! - the configuration watcher (the coordinator's own loop)
//!
//! The session ends when every monitor has finished, the kill switch trips,
//! the feed fails for good, or the configuration stays unreadable for too
//! many consecutive polls. Shutdown then runs in a fixed order: flag, drop
//! subscriptions, stop the feed, give tasks a grace period, abort the rest,
//! and join everything.

use crate::config::{ConfigSource, SessionSettings, SymbolConfig};
use crate::core::{Clock, ClosedPosition, SystemClock};
use crate::data::{PriceBook, TradeValidator};
use crate::engine::{
    DayTradeBudget, ExitKind, MonitorContext, MonitorExit, MonitorTask, SymbolMonitor,
};
use crate::execution::OrderExecutor;
use crate::indicators::IndicatorEngine;
use crate::journal::{EventTag, Journal};
use crate::monitoring::MetricsRegistry;
use crate::notify::Notifier;
use crate::resilience::{panic_message, KillSwitch, KillSwitchState};
use crate::stream::{BarHistory, MarketDataFeed, MarketRouter, StreamSupervisor, SupervisorHandle};
use anyhow::{bail, Context, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{Id, JoinSet};
use tracing::{debug, error, info, warn};

/// How the session came to an end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Every monitor finished on its own
    Completed,
    /// Shutdown requested from outside
    Interrupted(String),
    Fatal(String),
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub outcome: SessionOutcome,
    pub exits: Vec<MonitorExit>,
    /// Monitors that missed the grace period
    pub aborted: Vec<String>,
    /// Positions flattened by the end-of-day sweep
    pub swept: Vec<ClosedPosition>,
    pub day_trades_used: u32,
}

impl SessionSummary {
    pub fn exit_for(&self, symbol: &str) -> Option<&MonitorExit> {
        self.exits.iter().find(|exit| exit.symbol == symbol)
    }
}

pub struct Coordinator {
    settings: Arc<SessionSettings>,
    symbols: Vec<SymbolConfig>,
    executor: Arc<dyn OrderExecutor>,
    journal: Journal,
    notifier: Notifier,
    metrics: MetricsRegistry,
    kill_switch: KillSwitch,
    clock: Arc<dyn Clock>,
    prices: Arc<PriceBook>,
    indicators: Arc<IndicatorEngine>,
    budget: Arc<DayTradeBudget>,
}

/// Bookkeeping for the running monitor tasks
struct Monitors {
    set: JoinSet<MonitorExit>,
    names: HashMap<Id, String>,
    configs: HashMap<String, watch::Sender<Option<SymbolConfig>>>,
    finished: HashSet<String>,
    exits: Vec<MonitorExit>,
}

impl Coordinator {
    pub fn new(
        settings: SessionSettings,
        symbols: Vec<SymbolConfig>,
        executor: Arc<dyn OrderExecutor>,
        journal: Journal,
        notifier: Notifier,
        kill_switch: KillSwitch,
    ) -> Result<Self> {
        settings.validate().context("invalid session settings")?;
        if symbols.is_empty() {
            bail!("no symbols configured");
        }

        let metrics = MetricsRegistry::new().context("failed to create metrics registry")?;
        let indicators = Arc::new(IndicatorEngine::new(
            settings.indicators.clone(),
            settings.timezone,
        ));
        let budget = Arc::new(DayTradeBudget::new(settings.day_trade_limit));

        Ok(Self {
            settings: Arc::new(settings),
            symbols,
            executor,
            journal,
            notifier,
            metrics,
            kill_switch,
            clock: Arc::new(SystemClock),
            prices: Arc::new(PriceBook::new()),
            indicators,
            budget,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share an externally created price book (e.g. with a paper executor)
    pub fn with_prices(mut self, prices: Arc<PriceBook>) -> Self {
        self.prices = prices;
        self
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn prices(&self) -> &Arc<PriceBook> {
        &self.prices
    }

    pub fn indicators(&self) -> &Arc<IndicatorEngine> {
        &self.indicators
    }

    pub fn budget(&self) -> &Arc<DayTradeBudget> {
        &self.budget
    }

    /// Run the session to completion
    pub async fn run<F, C>(
        self,
        feed: F,
        mut config_source: C,
        history: Option<Arc<dyn BarHistory>>,
    ) -> Result<SessionSummary>
    where
        F: MarketDataFeed + 'static,
        C: ConfigSource,
    {
        info!(
            symbols = self.symbols.len(),
            day_trade_limit = self.settings.day_trade_limit,
            eod_cutoff = %self.settings.eod_cutoff,
            mode = ?self.executor.execution_mode(),
            "Session starting"
        );

        if let Some(history) = &history {
            for config in &self.symbols {
                self.seed(history.as_ref(), &config.symbol).await;
            }
        }

        let validator = Arc::new(TradeValidator::new(
            self.settings.validation.clone(),
            self.prices.clone(),
            self.journal.clone(),
        ));
        let router = MarketRouter::new(validator, self.indicators.clone(), self.metrics.clone());
        let (supervisor, feed_handle) = StreamSupervisor::new(
            feed,
            router,
            self.settings.feed_retry.clone(),
            self.metrics.clone(),
        );
        let mut feed_task = tokio::spawn(supervisor.run());
        let mut feed_done = false;

        let ctx = MonitorContext {
            executor: self.executor.clone(),
            budget: self.budget.clone(),
            journal: self.journal.clone(),
            notifier: self.notifier.clone(),
            metrics: self.metrics.clone(),
            kill_switch: self.kill_switch.clone(),
            clock: self.clock.clone(),
        };

        let mut monitors = Monitors {
            set: JoinSet::new(),
            names: HashMap::new(),
            configs: HashMap::new(),
            finished: HashSet::new(),
            exits: Vec::new(),
        };
        for config in self.symbols.clone() {
            self.spawn_monitor(&mut monitors, config, &feed_handle, &ctx);
        }

        let mut config_poll = tokio::time::interval(self.settings.config_poll());
        config_poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        config_poll.tick().await;
        let mut config_failures = 0u32;
        let mut rejected_edit = false;

        let outcome = loop {
            tokio::select! {
                joined = monitors.set.join_next_with_id(), if !monitors.set.is_empty() => {
                    if let Some(joined) = joined {
                        self.on_monitor_joined(&mut monitors, joined, &feed_handle);
                    }
                    if monitors.set.is_empty() {
                        info!("All monitors finished");
                        break SessionOutcome::Completed;
                    }
                }

                result = &mut feed_task, if !feed_done => {
                    feed_done = true;
                    let reason = match result {
                        Ok(Ok(())) => "feed supervisor stopped unexpectedly".to_string(),
                        Ok(Err(e)) => e.to_string(),
                        Err(e) => format!("feed supervisor task failed: {}", e),
                    };
                    self.kill_switch.fatal(&reason);
                    self.notifier.push_note("Session halted", reason.clone());
                    break SessionOutcome::Fatal(reason);
                }

                _ = config_poll.tick() => {
                    match config_source.poll_for_update() {
                        Ok(None) => config_failures = 0,
                        Ok(Some(configs)) => {
                            config_failures = 0;
                            rejected_edit = false;
                            self.metrics.session().config_reloads_total.inc();
                            self.apply_reload(&mut monitors, configs, &feed_handle, &ctx, history.as_deref()).await;
                        }
                        Err(e) if !e.is_unreadable() => {
                            // Readable but bad content: keep running on the last good list
                            config_failures = 0;
                            self.metrics.session().config_errors_total.inc();
                            if !rejected_edit {
                                warn!(error = %e, "Configuration edit rejected, keeping last good configuration");
                                rejected_edit = true;
                            } else {
                                debug!(error = %e, "Configuration still invalid");
                            }
                        }
                        Err(e) => {
                            config_failures += 1;
                            self.metrics.session().config_errors_total.inc();
                            warn!(
                                error = %e,
                                consecutive = config_failures,
                                limit = self.settings.max_config_failures,
                                "Configuration poll failed"
                            );
                            if config_failures >= self.settings.max_config_failures {
                                let reason = format!(
                                    "configuration unreadable for {} consecutive polls: {}",
                                    config_failures, e
                                );
                                self.kill_switch.fatal(&reason);
                                self.notifier.push_note("Session halted", reason.clone());
                                break SessionOutcome::Fatal(reason);
                            }
                        }
                    }
                }

                _ = self.kill_switch.wait() => {
                    let reason = self
                        .kill_switch
                        .shutdown_reason()
                        .unwrap_or_else(|| "shutdown requested".to_string());
                    break match self.kill_switch.state() {
                        KillSwitchState::Fatal => SessionOutcome::Fatal(reason),
                        _ => SessionOutcome::Interrupted(reason),
                    };
                }
            }
        };

        // Shutdown sequence
        if self.kill_switch.is_running() {
            self.kill_switch.shutdown("session complete");
        }
        let active: Vec<String> = monitors.configs.keys().cloned().collect();
        if !active.is_empty() {
            feed_handle.unsubscribe(&active);
        }
        feed_handle.stop();

        let grace = self.settings.shutdown_grace();
        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = monitors.set.join_next_with_id().await {
                self.on_monitor_joined(&mut monitors, joined, &feed_handle);
            }
        })
        .await;

        let mut aborted = Vec::new();
        if drained.is_err() {
            warn!(remaining = monitors.set.len(), "Grace period elapsed, aborting monitors");
            monitors.set.abort_all();
            while let Some(joined) = monitors.set.join_next_with_id().await {
                match joined {
                    Err(e) if e.is_cancelled() => {
                        if let Some(symbol) = monitors.names.remove(&e.id()) {
                            self.metrics.session().monitors_active.dec();
                            aborted.push(symbol);
                        }
                    }
                    other => self.on_monitor_joined(&mut monitors, other, &feed_handle),
                }
            }
        }

        if !feed_done {
            match tokio::time::timeout(grace, &mut feed_task).await {
                Ok(Ok(Err(e))) => warn!(error = %e, "Feed supervisor ended with error"),
                Ok(Err(e)) => warn!(error = %e, "Feed supervisor task failed"),
                Ok(Ok(Ok(()))) => {}
                Err(_) => {
                    warn!("Feed supervisor did not stop in time, aborting");
                    feed_task.abort();
                }
            }
        }

        let swept = self.eod_sweep(&monitors.exits).await;

        self.journal.flush();
        self.notifier.flush().await;

        let summary = SessionSummary {
            outcome,
            exits: monitors.exits,
            aborted,
            swept,
            day_trades_used: self.budget.used().await,
        };
        info!(
            outcome = ?summary.outcome,
            monitors = summary.exits.len(),
            aborted = summary.aborted.len(),
            swept = summary.swept.len(),
            day_trades_used = summary.day_trades_used,
            "Session ended"
        );
        info!("Session metrics\n{}", self.metrics.render());
        Ok(summary)
    }

    async fn seed(&self, history: &dyn BarHistory, symbol: &str) {
        let config = &self.settings.indicators;
        let end = self.clock.now();
        let start = end - chrono::Duration::minutes(config.seed_lookback_minutes);

        match history.get_bars(symbol, start, end, config.timeframe).await {
            Ok(bars) => {
                let count = bars.len();
                let snapshot = self.indicators.seed(symbol, bars);
                info!(
                    symbol,
                    bars = count,
                    rsi = snapshot.rsi,
                    macd_ready = snapshot.macd_ready(),
                    "Indicators seeded"
                );
            }
            Err(e) => warn!(symbol, error = %e, "Bar history unavailable, starting cold"),
        }
    }

    fn spawn_monitor(
        &self,
        monitors: &mut Monitors,
        config: SymbolConfig,
        feed: &SupervisorHandle,
        ctx: &MonitorContext,
    ) {
        let symbol = config.symbol.clone();
        let (sender, receiver) = watch::channel(Some(config.clone()));
        let task = MonitorTask::new(
            SymbolMonitor::new(config, self.settings.clone()),
            receiver,
            self.prices.clone(),
            self.indicators.clone(),
            feed.clone(),
            ctx.clone(),
        );

        feed.subscribe(std::slice::from_ref(&symbol));
        let handle = monitors.set.spawn(task.run());
        monitors.names.insert(handle.id(), symbol.clone());
        monitors.configs.insert(symbol, sender);
        self.metrics.session().monitors_active.inc();
    }

    fn on_monitor_joined(
        &self,
        monitors: &mut Monitors,
        joined: Result<(Id, MonitorExit), tokio::task::JoinError>,
        feed: &SupervisorHandle,
    ) {
        let exit = match joined {
            Ok((id, exit)) => {
                monitors.names.remove(&id);
                exit
            }
            Err(e) => {
                let Some(symbol) = monitors.names.remove(&e.id()) else {
                    return;
                };
                let reason = if e.is_panic() {
                    format!("panicked: {}", panic_message(e.into_panic().as_ref()))
                } else {
                    "cancelled".to_string()
                };
                error!(symbol = %symbol, reason = %reason, "Monitor task died");
                self.metrics.session().monitor_failures_total.inc();
                self.notifier
                    .push_note(format!("{} monitor stopped", symbol), reason.clone());
                feed.unsubscribe(std::slice::from_ref(&symbol));
                MonitorExit {
                    symbol,
                    reason: ExitKind::Failed(reason),
                    remaining_qty: 0,
                }
            }
        };

        debug!(symbol = %exit.symbol, reason = ?exit.reason, "Monitor joined");
        self.metrics.session().monitors_active.dec();
        monitors.configs.remove(&exit.symbol);
        monitors.finished.insert(exit.symbol.clone());
        monitors.exits.push(exit);
    }

    async fn apply_reload(
        &self,
        monitors: &mut Monitors,
        configs: Vec<SymbolConfig>,
        feed: &SupervisorHandle,
        ctx: &MonitorContext,
        history: Option<&dyn BarHistory>,
    ) {
        let listed: HashSet<String> = configs.iter().map(|c| c.symbol.clone()).collect();

        let removed: Vec<String> = monitors
            .configs
            .keys()
            .filter(|symbol| !listed.contains(*symbol))
            .cloned()
            .collect();
        for symbol in &removed {
            if let Some(sender) = monitors.configs.get(symbol) {
                sender.send_replace(None);
            }
        }

        let mut added = 0usize;
        for config in configs {
            if let Some(sender) = monitors.configs.get(&config.symbol) {
                sender.send_if_modified(|current| {
                    if current.as_ref() == Some(&config) {
                        false
                    } else {
                        *current = Some(config.clone());
                        true
                    }
                });
            } else if monitors.finished.contains(&config.symbol) {
                debug!(symbol = %config.symbol, "Symbol already finished this session");
            } else {
                if let Some(history) = history {
                    self.seed(history, &config.symbol).await;
                }
                self.spawn_monitor(monitors, config, feed, ctx);
                added += 1;
            }
        }

        info!(added, removed = removed.len(), "Configuration reloaded");
    }

    /// Flatten anything still open once every monitor hit the cutoff
    async fn eod_sweep(&self, exits: &[MonitorExit]) -> Vec<ClosedPosition> {
        let all_eod = !exits.is_empty() && exits.iter().all(MonitorExit::is_end_of_day);
        if !self.settings.eod_sweep || !all_eod {
            return Vec::new();
        }

        match self.executor.close_all_positions().await {
            Ok(closed) => {
                let now = self.clock.now();
                for position in &closed {
                    let price = self.prices.latest_price(&position.symbol).unwrap_or(0.0);
                    self.journal
                        .record_trade(now, &position.symbol, EventTag::EodExit, position.qty, price);
                    self.metrics
                        .trading()
                        .transitions_total
                        .with_label_values(&[EventTag::EodExit.as_str()])
                        .inc();
                    warn!(symbol = %position.symbol, qty = position.qty, "EOD sweep closed a leftover position");
                }
                info!(closed = closed.len(), "EOD sweep complete");
                closed
            }
            Err(e) => {
                error!(error = %e, "EOD sweep failed");
                self.notifier.push_note("EOD sweep failed", e.to_string());
                Vec::new()
            }
        }
    }
}

