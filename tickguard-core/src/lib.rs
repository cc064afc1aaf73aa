//! Tickguard Core - tick-validated intraday trade monitor
//!
//! Watches a small list of equities on one shared market data stream,
//! discards ghost prints that disagree with the recent quotes, and drives a
//! per-symbol position state machine: one entry above a trigger price, then
//! stop-loss, take-profit scale-outs and end-of-day liquidation. All symbols
//! share one pattern-day-trade budget.
//!
//! ## Architecture
//! - One tokio task per symbol, one feed supervisor, one coordinator loop
//! - Shared state in `DashMap`s, copied on read; nothing is held across an order
//! - Broker, feed, history, notifications and config storage behind traits
//!
//! ## Core Modules
//! - `core`: market data types, position lifecycle, clock
//! - `config`: symbol and session configuration, hot reload
//! - `data`: quote windows, trade validation, validated prices
//! - `indicators`: RSI, MACD and session VWAP over a bar window
//! - `engine`: take-profit gates, day-trade budget, symbol monitors
//! - `stream`: feed traits, supervisor with reconnection, replay
//! - `execution`: broker trait and the paper broker
//! - `journal`: trade and tick logs on a background writer thread
//! - `notify`: best-effort push notifications
//! - `coordinator`: session wiring and shutdown
//! - `report`: daily P/L from the trade log

pub mod config;
pub mod coordinator;
pub mod core;
pub mod data;
pub mod engine;
pub mod execution;
pub mod indicators;
pub mod journal;
pub mod monitoring;
pub mod notify;
pub mod report;
pub mod resilience;
pub mod stream;
pub mod testing;
pub mod utils;

pub use crate::config::{ConfigSource, FileConfigSource, SessionSettings, SymbolConfig};
pub use crate::coordinator::{Coordinator, SessionOutcome, SessionSummary};
pub use crate::core::{Bar, Phase, PositionState, QuoteEntry, Side, TradeTick};
pub use crate::data::{PriceBook, TradeValidator, Verdict};
pub use crate::engine::{DayTradeBudget, SymbolMonitor};
pub use crate::execution::{ExecutionMode, OrderExecutor, PaperExecutor};
pub use crate::journal::{EventTag, Journal};
pub use crate::notify::{LogNotifier, Notifier};
pub use crate::resilience::KillSwitch;
pub use crate::stream::{FileBarHistory, MarketDataFeed, ReplayFeed};

pub use anyhow::{Error, Result};
