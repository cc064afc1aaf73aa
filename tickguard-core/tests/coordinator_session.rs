use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tickguard_core::config::{SessionSettings, SymbolConfig};
use tickguard_core::coordinator::{Coordinator, SessionOutcome, SessionSummary};
use tickguard_core::core::{ClosedPosition, ManualClock, OrderResult, Side};
use tickguard_core::engine::{ExitKind, FinishReason};
use tickguard_core::execution::{ExecutionError, ExecutionMode, OrderExecutor, PaperExecutor};
use tickguard_core::journal::Journal;
use tickguard_core::notify::Notifier;
use tickguard_core::resilience::{KillSwitch, RetryPolicy};
use tickguard_core::testing::{
    fast_settings, quote_around, round_lot, session_time, MemorySink,
    RecordingTransport, ScriptedConfigSource, ScriptedFeed,
};
use tokio::task::JoinHandle;

struct Session {
    feed: ScriptedFeed,
    config: ScriptedConfigSource,
    trades: MemorySink,
    transport: RecordingTransport,
    kill_switch: KillSwitch,
    task: JoinHandle<anyhow::Result<SessionSummary>>,
}

fn start(
    settings: SessionSettings,
    symbols: Vec<SymbolConfig>,
    executor: Arc<dyn OrderExecutor>,
    hour: u32,
    minute: u32,
) -> Session {
    let feed = ScriptedFeed::new();
    let config = ScriptedConfigSource::new();
    let trades = MemorySink::new();
    let transport = RecordingTransport::new();
    let kill_switch = KillSwitch::new();
    let (notifier, _) = Notifier::spawn(transport.clone(), RetryPolicy::fixed(Duration::from_millis(10), 1));
    let journal = Journal::new(
        Arc::new(trades.clone()),
        Arc::new(MemorySink::new()),
        settings.timezone,
    );

    let coordinator = Coordinator::new(
        settings,
        symbols,
        executor,
        journal,
        notifier,
        kill_switch.clone(),
    )
    .unwrap()
    .with_clock(Arc::new(ManualClock::new(session_time(hour, minute, 0))));

    let task = tokio::spawn(coordinator.run(feed.clone(), config.clone(), None));
    Session {
        feed,
        config,
        trades,
        transport,
        kill_switch,
        task,
    }
}

fn push_print(feed: &ScriptedFeed, symbol: &str, price: f64) {
    let at = session_time(10, 0, 0);
    feed.push_quote(symbol, quote_around(price, at));
    feed.push_trade(round_lot(symbol, price, at));
}

async fn wait_for(mut done: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test(start_paused = true)]
async fn test_shared_budget_admits_one_entry() {
    let executor = Arc::new(PaperExecutor::new());
    let s = start(
        fast_settings(),
        vec![
            SymbolConfig::new("ABCD", 5.00, 4.50),
            SymbolConfig::new("WXYZ", 3.00, 2.50),
        ],
        executor.clone(),
        10,
        0,
    );
    push_print(&s.feed, "ABCD", 5.10);
    push_print(&s.feed, "WXYZ", 3.10);

    let trades = s.trades.clone();
    wait_for(|| trades.tagged("ENTRY").len() + trades.tagged("SKIP").len() == 2).await;
    s.kill_switch.shutdown("test over");
    let summary = s.task.await.unwrap().unwrap();

    assert_eq!(s.trades.tagged("ENTRY").len(), 1);
    assert_eq!(s.trades.tagged("SKIP").len(), 1);
    assert_eq!(summary.day_trades_used, 1);
    assert_eq!(executor.orders().len(), 1);
    assert_eq!(summary.outcome, SessionOutcome::Interrupted("test over".to_string()));
    assert!(summary
        .exits
        .iter()
        .all(|exit| exit.reason == ExitKind::Finished(FinishReason::Shutdown)));
}

#[tokio::test(start_paused = true)]
async fn test_cutoff_ends_session_and_sweeps() {
    let executor = Arc::new(PaperExecutor::new());
    executor.set_position("OLD", 250);
    let s = start(
        fast_settings(),
        vec![SymbolConfig::new("ABCD", 5.00, 4.50)],
        executor.clone(),
        15,
        56,
    );

    let summary = s.task.await.unwrap().unwrap();

    assert_eq!(summary.outcome, SessionOutcome::Completed);
    assert!(summary.exit_for("ABCD").unwrap().is_end_of_day());
    assert_eq!(
        summary.swept,
        vec![ClosedPosition {
            symbol: "OLD".to_string(),
            qty: 250
        }]
    );
    let eod = s.trades.tagged("EOD EXIT");
    assert_eq!(eod.len(), 1);
    assert!(eod[0].contains(",OLD,EOD EXIT,250,"));
    assert_eq!(executor.position("OLD"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_can_be_disabled() {
    let executor = Arc::new(PaperExecutor::new());
    executor.set_position("OLD", 250);
    let settings = SessionSettings {
        eod_sweep: false,
        ..fast_settings()
    };
    let s = start(settings, vec![SymbolConfig::new("ABCD", 5.00, 4.50)], executor.clone(), 15, 56);

    let summary = s.task.await.unwrap().unwrap();

    assert!(summary.swept.is_empty());
    assert_eq!(executor.position("OLD"), 250);
}

#[tokio::test(start_paused = true)]
async fn test_feed_exhaustion_is_fatal() {
    let s = start(
        fast_settings(),
        vec![SymbolConfig::new("ABCD", 5.00, 4.50)],
        Arc::new(PaperExecutor::new()),
        10,
        0,
    );
    s.feed.fail_connects(100);

    let summary = s.task.await.unwrap().unwrap();

    assert!(matches!(summary.outcome, SessionOutcome::Fatal(ref reason) if reason.contains("reconnection failed")));
    assert!(s.kill_switch.should_stop());
    assert!(s.transport.titles().contains(&"Session halted".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_reload_updates_adds_and_removes() {
    let s = start(
        fast_settings(),
        vec![
            SymbolConfig::new("ABCD", 5.00, 4.50),
            SymbolConfig::new("WXYZ", 3.00, 2.50),
        ],
        Arc::new(PaperExecutor::new()),
        10,
        0,
    );
    s.config.push_update(vec![
        SymbolConfig::new("ABCD", 5.00, 4.80),
        SymbolConfig::new("NEWS", 7.00, 6.00),
    ]);

    let feed = s.feed.clone();
    wait_for(|| feed.subscribed().contains("NEWS") && !feed.subscribed().contains("WXYZ")).await;
    s.kill_switch.shutdown("test over");
    let summary = s.task.await.unwrap().unwrap();

    assert_eq!(
        summary.exit_for("WXYZ").unwrap().reason,
        ExitKind::Finished(FinishReason::Removed)
    );
    assert_eq!(
        summary.exit_for("NEWS").unwrap().reason,
        ExitKind::Finished(FinishReason::Shutdown)
    );
    assert_eq!(summary.exits.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_config_failures_are_fatal() {
    let settings = SessionSettings {
        max_config_failures: 3,
        ..fast_settings()
    };
    let s = start(settings, vec![SymbolConfig::new("ABCD", 5.00, 4.50)], Arc::new(PaperExecutor::new()), 10, 0);
    for _ in 0..3 {
        s.config.push_error("permission denied");
    }

    let summary = s.task.await.unwrap().unwrap();

    assert!(matches!(summary.outcome, SessionOutcome::Fatal(ref reason) if reason.contains("3 consecutive")));
    assert_eq!(s.config.calls(), 3);
}

/// Broker that panics on one symbol
struct BoomExecutor {
    inner: PaperExecutor,
}

#[async_trait]
impl OrderExecutor for BoomExecutor {
    async fn submit_order(&self, symbol: &str, qty: u64, side: Side) -> Result<OrderResult, ExecutionError> {
        if symbol == "BOOM" {
            panic!("broker exploded");
        }
        self.inner.submit_order(symbol, qty, side).await
    }

    async fn close_position(&self, symbol: &str, qty: u64) -> Result<OrderResult, ExecutionError> {
        self.inner.close_position(symbol, qty).await
    }

    async fn close_all_positions(&self) -> Result<Vec<ClosedPosition>, ExecutionError> {
        self.inner.close_all_positions().await
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Paper
    }
}

#[tokio::test(start_paused = true)]
async fn test_panicking_monitor_is_isolated() {
    let settings = SessionSettings {
        day_trade_limit: 2,
        ..fast_settings()
    };
    let s = start(
        settings,
        vec![
            SymbolConfig::new("BOOM", 5.00, 4.50),
            SymbolConfig::new("ABCD", 5.00, 4.50),
        ],
        Arc::new(BoomExecutor {
            inner: PaperExecutor::new(),
        }),
        10,
        0,
    );
    push_print(&s.feed, "BOOM", 5.10);
    push_print(&s.feed, "ABCD", 5.10);

    let trades = s.trades.clone();
    wait_for(|| trades.tagged("ENTRY").len() == 1).await;
    let transport = s.transport.clone();
    wait_for(|| transport.titles().iter().any(|t| t == "BOOM monitor stopped")).await;
    s.kill_switch.shutdown("test over");
    let summary = s.task.await.unwrap().unwrap();

    match &summary.exit_for("BOOM").unwrap().reason {
        ExitKind::Failed(reason) => assert!(reason.contains("broker exploded"), "{}", reason),
        other => panic!("unexpected exit {:?}", other),
    }
    assert_eq!(
        summary.exit_for("ABCD").unwrap().reason,
        ExitKind::Finished(FinishReason::Shutdown)
    );
    assert!(s.trades.tagged("ENTRY")[0].contains(",ABCD,ENTRY,"));
}

#[tokio::test(start_paused = true)]
async fn test_bad_config_edit_keeps_last_good_list() {
    let settings = SessionSettings {
        max_config_failures: 3,
        ..fast_settings()
    };
    let s = start(settings, vec![SymbolConfig::new("ABCD", 5.00, 4.50)], Arc::new(PaperExecutor::new()), 10, 0);
    for _ in 0..10 {
        s.config.push_invalid("stop_loss must be below entry_price");
    }
    s.config.push_update(vec![
        SymbolConfig::new("ABCD", 5.00, 4.50),
        SymbolConfig::new("NEWS", 7.00, 6.00),
    ]);

    let feed = s.feed.clone();
    wait_for(|| feed.subscribed().contains("NEWS")).await;
    assert!(s.config.calls() >= 11);
    assert!(!s.kill_switch.should_stop());
    s.kill_switch.shutdown("test over");
    let summary = s.task.await.unwrap().unwrap();

    assert_eq!(summary.outcome, SessionOutcome::Interrupted("test over".to_string()));
    assert_eq!(
        summary.exit_for("ABCD").unwrap().reason,
        ExitKind::Finished(FinishReason::Shutdown)
    );
}

#[tokio::test(start_paused = true)]
async fn test_removal_ends_dormant_monitor() {
    let settings = SessionSettings {
        day_trade_limit: 0,
        ..fast_settings()
    };
    let s = start(
        settings,
        vec![
            SymbolConfig::new("ABCD", 5.00, 4.50),
            SymbolConfig::new("WXYZ", 3.00, 2.50),
        ],
        Arc::new(PaperExecutor::new()),
        10,
        0,
    );
    push_print(&s.feed, "ABCD", 5.10);

    let trades = s.trades.clone();
    wait_for(|| trades.tagged("SKIP").len() == 1).await;
    s.config.push_update(vec![SymbolConfig::new("WXYZ", 3.00, 2.50)]);

    // Well inside the five hour dormancy
    let feed = s.feed.clone();
    wait_for(|| !feed.subscribed().contains("ABCD")).await;
    s.kill_switch.shutdown("test over");
    let summary = s.task.await.unwrap().unwrap();

    assert_eq!(
        summary.exit_for("ABCD").unwrap().reason,
        ExitKind::Finished(FinishReason::Removed)
    );
    assert_eq!(s.trades.tagged("SKIP").len(), 1);
}
