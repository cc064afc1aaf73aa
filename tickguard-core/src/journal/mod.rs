//! Append-only trade and tick logs

pub mod records;
pub mod writer;

pub use records::{EventTag, RecordParseError, TickRecord, TradeRecord, TIMESTAMP_FORMAT};
pub use writer::{LogWriter, NullSink, RecordSink};

use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::path::Path;
use std::sync::Arc;

/// The session's two logs plus the zone their timestamps are written in
#[derive(Clone)]
pub struct Journal {
    trades: Arc<dyn RecordSink>,
    ticks: Arc<dyn RecordSink>,
    tz: Tz,
}

impl Journal {
    pub fn new(trades: Arc<dyn RecordSink>, ticks: Arc<dyn RecordSink>, tz: Tz) -> Self {
        Self { trades, ticks, tz }
    }

    /// File-backed journal; neither log drops records
    pub fn open(trade_log: &Path, tick_log: &Path, tz: Tz) -> Result<Self> {
        let trades = LogWriter::open(trade_log)?;
        let ticks = LogWriter::open(tick_log)?;
        Ok(Self::new(Arc::new(trades), Arc::new(ticks), tz))
    }

    /// Journal that writes nowhere
    pub fn discard(tz: Tz) -> Self {
        Self::new(Arc::new(NullSink), Arc::new(NullSink), tz)
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Append one trade log line and return the record written
    pub fn record_trade(
        &self,
        at: DateTime<Utc>,
        symbol: &str,
        tag: EventTag,
        qty: u64,
        price: f64,
    ) -> TradeRecord {
        let record = TradeRecord::new(at, self.tz, symbol, tag, qty, price);
        self.trades.append(record.to_line());
        record
    }

    pub fn record_tick(&self, record: &TickRecord<'_>) {
        self.ticks.append(record.to_line());
    }

    pub fn flush(&self) {
        self.trades.flush();
        self.ticks.flush();
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal").field("tz", &self.tz).finish_non_exhaustive()
    }
}
