//! Trading engine
//!
//! - `budget`: process-wide day-trade counter
//! - `take_profit`: trailing, MACD and VWAP-extension exit gates
//! - `monitor`: per-symbol position state machine
//! - `runner`: the task loop driving one monitor

pub mod budget;
pub mod monitor;
pub mod runner;
pub mod take_profit;

pub use budget::{BudgetGuard, DayTradeBudget};
pub use monitor::{
    Decision, ExitReason, FinishReason, MonitorContext, MonitorError, SymbolMonitor, TickInput,
    TickOutcome,
};
pub use runner::{ExitKind, MonitorExit, MonitorTask};
pub use take_profit::{ExitSize, Gate, TakeProfitInput, TakeProfitPolicy, TakeProfitTracker};
