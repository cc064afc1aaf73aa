//! Upstream market data
//!
//! - [`MarketDataFeed`]: one streaming session of trades, quotes and bars
//! - [`BarHistory`]: historical bars used to seed indicators at startup
//! - `supervisor`: owns the feed, reconnects it and applies subscriptions
//! - `router`: fans events out to the validator and indicator engine
//! - `replay` / `history`: JSONL-backed implementations for paper sessions

pub mod history;
pub mod replay;
pub mod router;
pub mod supervisor;

pub use history::FileBarHistory;
pub use replay::ReplayFeed;
pub use router::MarketRouter;
pub use supervisor::{StreamSupervisor, SupervisorError, SupervisorHandle};

use crate::core::{Bar, QuoteEntry, Timeframe, TradeTick};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One message from the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeedEvent {
    Trade(TradeTick),
    Quote { symbol: String, quote: QuoteEntry },
    Bar { symbol: String, bar: Bar },
}

impl FeedEvent {
    pub fn symbol(&self) -> &str {
        match self {
            FeedEvent::Trade(trade) => &trade.symbol,
            FeedEvent::Quote { symbol, .. } | FeedEvent::Bar { symbol, .. } => symbol,
        }
    }
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed connection failed: {0}")]
    Connect(String),

    #[error("feed disconnected: {0}")]
    Disconnected(String),

    #[error("malformed feed message: {0}")]
    Decode(String),

    #[error("feed io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A streaming market data session
///
/// `next_event` returning `Ok(None)` means the stream ended cleanly; an error
/// means the session is broken and must be reconnected.
#[async_trait]
pub trait MarketDataFeed: Send {
    async fn connect(&mut self) -> Result<(), FeedError>;

    async fn subscribe(&mut self, symbols: &[String]) -> Result<(), FeedError>;

    async fn unsubscribe(&mut self, symbols: &[String]) -> Result<(), FeedError>;

    async fn next_event(&mut self) -> Result<Option<FeedEvent>, FeedError>;

    async fn close(&mut self);
}

/// Source of historical bars
#[async_trait]
pub trait BarHistory: Send + Sync {
    /// Bars for `symbol` within `[start, end]`, oldest first
    async fn get_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        timeframe: Timeframe,
    ) -> Result<Vec<Bar>, FeedError>;
}
