//! Trade and tick log line formats
//!
//! Trade log: `timestamp,symbol,event_tag,qty,price`
//! Tick log:  `timestamp,symbol,price,size,conditions,ACCEPT|REJECT:<reason>`
//!
//! Timestamps are written in the exchange time zone with an explicit offset.

use crate::data::Verdict;
use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f%:z";

/// Position state machine transition recorded in the trade log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTag {
    Entry,
    Skip,
    /// Stop-loss
    Exit,
    EodExit,
    HalfExit,
    SecondHalfExit,
    FullExit,
}

impl EventTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventTag::Entry => "ENTRY",
            EventTag::Skip => "SKIP",
            EventTag::Exit => "EXIT",
            EventTag::EodExit => "EOD EXIT",
            EventTag::HalfExit => "50% Exit",
            EventTag::SecondHalfExit => "2nd 50% Exit",
            EventTag::FullExit => "100% Exit",
        }
    }

    /// Tags that reduce an open position
    pub fn is_exit(&self) -> bool {
        !matches!(self, EventTag::Entry | EventTag::Skip)
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventTag {
    type Err = RecordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "ENTRY" => EventTag::Entry,
            "SKIP" => EventTag::Skip,
            "EXIT" => EventTag::Exit,
            "EOD EXIT" => EventTag::EodExit,
            "50% Exit" => EventTag::HalfExit,
            "2nd 50% Exit" => EventTag::SecondHalfExit,
            "100% Exit" => EventTag::FullExit,
            other => return Err(RecordParseError::UnknownTag(other.to_string())),
        })
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RecordParseError {
    #[error("expected 5 fields, found {0}")]
    FieldCount(usize),
    #[error("bad timestamp {0:?}")]
    Timestamp(String),
    #[error("unknown event tag {0:?}")]
    UnknownTag(String),
    #[error("bad number {0:?}")]
    Number(String),
}

/// One line of the trade log
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub timestamp: DateTime<FixedOffset>,
    pub symbol: String,
    pub tag: EventTag,
    pub qty: u64,
    pub price: f64,
}

impl TradeRecord {
    pub fn new(at: DateTime<Utc>, tz: Tz, symbol: &str, tag: EventTag, qty: u64, price: f64) -> Self {
        Self {
            timestamp: at.with_timezone(&tz).fixed_offset(),
            symbol: symbol.to_string(),
            tag,
            qty,
            price,
        }
    }

    pub fn to_line(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.symbol,
            self.tag,
            self.qty,
            self.price
        )
    }

    pub fn parse_line(line: &str) -> Result<Self, RecordParseError> {
        let fields: Vec<&str> = line.trim_end().split(',').collect();
        if fields.len() != 5 {
            return Err(RecordParseError::FieldCount(fields.len()));
        }
        let timestamp = DateTime::parse_from_str(fields[0], TIMESTAMP_FORMAT)
            .map_err(|_| RecordParseError::Timestamp(fields[0].to_string()))?;
        let tag = fields[2].parse()?;
        let qty = fields[3]
            .parse()
            .map_err(|_| RecordParseError::Number(fields[3].to_string()))?;
        let price = fields[4]
            .parse()
            .map_err(|_| RecordParseError::Number(fields[4].to_string()))?;

        Ok(Self {
            timestamp,
            symbol: fields[1].to_string(),
            tag,
            qty,
            price,
        })
    }
}

/// One line of the tick log
#[derive(Debug, Clone, PartialEq)]
pub struct TickRecord<'a> {
    pub timestamp: DateTime<FixedOffset>,
    pub symbol: &'a str,
    pub price: f64,
    pub size: u64,
    pub conditions: &'a [String],
    pub verdict: Verdict,
}

impl TickRecord<'_> {
    pub fn to_line(&self) -> String {
        let outcome = match self.verdict {
            Verdict::Accept(_) => "ACCEPT".to_string(),
            Verdict::Reject(reason) => format!("REJECT:{}", reason),
        };
        format!(
            "{},{},{},{},{},{}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.symbol,
            self.price,
            self.size,
            self.conditions.join("|"),
            outcome
        )
    }
}
