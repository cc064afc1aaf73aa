use std::sync::Arc;
use tickguard_core::config::{SessionSettings, SymbolConfig};
use tickguard_core::core::{Phase, Side};
use tickguard_core::engine::{FinishReason, SymbolMonitor, TickInput, TickOutcome};
use tickguard_core::execution::ExecutionError;
use tickguard_core::indicators::IndicatorSnapshot;
use tickguard_core::testing::{session_time, TestContext};

fn tick(hour: u32, minute: u32, price: f64, day_high: f64) -> TickInput {
    TickInput {
        now: session_time(hour, minute, 0),
        price,
        day_high,
        indicators: IndicatorSnapshot::default(),
        last_bar: None,
    }
}

fn monitor(config: SymbolConfig) -> SymbolMonitor {
    SymbolMonitor::new(config, Arc::new(SessionSettings::default()))
}

#[tokio::test]
async fn test_entry_then_stop_loss() {
    let t = TestContext::new(1, session_time(10, 0, 0));
    let mut m = monitor(SymbolConfig::new("ABCD", 5.00, 4.50));

    let outcome = m.on_tick(tick(10, 0, 5.10, 5.10), &t.ctx).await.unwrap();
    assert_eq!(outcome, TickOutcome::Continue);
    assert_eq!(m.position().phase(), Phase::InPosition);
    assert_eq!(m.position().entry_qty(), 800);

    let outcome = m.on_tick(tick(10, 1, 4.40, 5.10), &t.ctx).await.unwrap();
    assert_eq!(outcome, TickOutcome::Finished(FinishReason::Closed));
    assert_eq!(m.position().remaining_qty(), 0);
    assert_eq!(m.position().phase(), Phase::Closed);

    let lines = t.trades.lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with(",ABCD,ENTRY,800,5.1"), "{}", lines[0]);
    assert!(lines[1].ends_with(",ABCD,EXIT,800,4.4"), "{}", lines[1]);

    let orders = t.executor.orders();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].side, Side::Buy);
    assert_eq!(orders[1].side, Side::Sell);
    assert_eq!(t.ctx.budget.used().await, 1);
}

#[tokio::test]
async fn test_trailing_take_profit() {
    let t = TestContext::new(1, session_time(10, 0, 0));
    let mut m = monitor(SymbolConfig::new("ABCD", 5.00, 4.50).with_trailing_stop(5.0));

    m.on_tick(tick(10, 0, 5.10, 5.10), &t.ctx).await.unwrap();
    assert_eq!(
        m.on_tick(tick(10, 30, 6.00, 6.00), &t.ctx).await.unwrap(),
        TickOutcome::Continue
    );
    assert_eq!(m.position().phase(), Phase::InPosition);

    m.on_tick(tick(10, 45, 5.70, 6.00), &t.ctx).await.unwrap();
    assert_eq!(m.position().phase(), Phase::PartiallyExited);
    assert_eq!(m.position().remaining_qty(), 400);
    assert_eq!(t.trades.tagged("50% Exit").len(), 1);

    // Same price again: the trail is disarmed until price recovers
    m.on_tick(tick(10, 46, 5.70, 6.00), &t.ctx).await.unwrap();
    assert_eq!(m.position().remaining_qty(), 400);

    m.on_tick(tick(10, 50, 5.90, 6.00), &t.ctx).await.unwrap();
    let outcome = m.on_tick(tick(10, 55, 5.65, 6.00), &t.ctx).await.unwrap();
    assert_eq!(outcome, TickOutcome::Finished(FinishReason::Closed));
    assert_eq!(t.trades.tagged("2nd 50% Exit").len(), 1);
    assert_eq!(m.position().exits(), &[400, 400]);
}

#[tokio::test]
async fn test_closed_ticks_are_idempotent() {
    let t = TestContext::new(1, session_time(10, 0, 0));
    let mut m = monitor(SymbolConfig::new("ABCD", 5.00, 4.50));

    m.on_tick(tick(10, 0, 5.10, 5.10), &t.ctx).await.unwrap();
    m.on_tick(tick(10, 1, 4.40, 5.10), &t.ctx).await.unwrap();
    let orders = t.executor.orders().len();
    let records = t.trades.lines().len();

    for minute in 2..10 {
        let outcome = m.on_tick(tick(10, minute, 3.00, 5.10), &t.ctx).await.unwrap();
        assert_eq!(outcome, TickOutcome::Finished(FinishReason::Closed));
    }
    assert_eq!(t.executor.orders().len(), orders);
    assert_eq!(t.trades.lines().len(), records);
}

#[tokio::test]
async fn test_end_of_day_liquidates_remainder() {
    let t = TestContext::new(1, session_time(10, 0, 0));
    let mut m = monitor(SymbolConfig::new("ABCD", 5.00, 4.50));

    m.on_tick(tick(10, 0, 5.10, 5.10), &t.ctx).await.unwrap();
    let outcome = m.on_tick(tick(15, 55, 5.20, 5.30), &t.ctx).await.unwrap();

    assert_eq!(outcome, TickOutcome::Finished(FinishReason::EndOfDay));
    assert_eq!(t.trades.tagged("EOD EXIT").len(), 1);
    assert_eq!(t.executor.position("ABCD"), 0);
}

#[tokio::test]
async fn test_cutoff_without_entry_writes_nothing() {
    let t = TestContext::new(1, session_time(15, 55, 0));
    let mut m = monitor(SymbolConfig::new("ABCD", 5.00, 4.50));

    let outcome = m.on_tick(tick(15, 56, 5.50, 5.50), &t.ctx).await.unwrap();
    assert_eq!(outcome, TickOutcome::Finished(FinishReason::EndOfDay));
    assert_eq!(m.position().phase(), Phase::Closed);
    assert!(t.trades.lines().is_empty());
    assert!(t.executor.orders().is_empty());
}

#[tokio::test]
async fn test_exhausted_budget_skips_and_goes_dormant() {
    let t = TestContext::new(0, session_time(10, 0, 0));
    let mut m = monitor(SymbolConfig::new("ABCD", 5.00, 4.50));

    let outcome = m.on_tick(tick(10, 0, 5.10, 5.10), &t.ctx).await.unwrap();

    assert_eq!(
        outcome,
        TickOutcome::Dormant(std::time::Duration::from_secs(5 * 60 * 60))
    );
    assert_eq!(m.position().phase(), Phase::WaitingEntry);
    assert_eq!(t.trades.tagged("SKIP").len(), 1);
    assert!(t.executor.orders().is_empty());
}

#[tokio::test]
async fn test_failed_buy_leaves_budget_untouched() {
    let t = TestContext::new(1, session_time(10, 0, 0));
    let mut m = monitor(SymbolConfig::new("ABCD", 5.00, 4.50));
    t.executor.fail_next(ExecutionError::Rejected {
        symbol: "ABCD".to_string(),
        reason: "halted".to_string(),
    });

    let err = m.on_tick(tick(10, 0, 5.10, 5.10), &t.ctx).await.unwrap_err();

    assert!(err.to_string().contains("halted"));
    assert_eq!(t.ctx.budget.used().await, 0);
    assert_eq!(m.position().phase(), Phase::WaitingEntry);
    assert!(t.trades.lines().is_empty());
}

#[tokio::test]
async fn test_no_orders_after_shutdown() {
    let t = TestContext::new(1, session_time(10, 0, 0));
    let mut m = monitor(SymbolConfig::new("ABCD", 5.00, 4.50));
    t.ctx.kill_switch.shutdown("test");

    let outcome = m.on_tick(tick(10, 0, 5.10, 5.10), &t.ctx).await.unwrap();

    assert_eq!(outcome, TickOutcome::Finished(FinishReason::Shutdown));
    assert!(t.executor.orders().is_empty());
    assert_eq!(t.ctx.budget.used().await, 0);
}
