//! Daily profit/loss from the trade log
//!
//! Each symbol's last `ENTRY` of the day is paired with the exits that follow
//! it. The exit price is the quantity-weighted average across partial exits,
//! and the day total is the plain sum of per-symbol percentages.

use crate::journal::{EventTag, TradeRecord};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to read trade log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolPnl {
    pub symbol: String,
    pub entry_price: f64,
    /// Quantity-weighted average exit price
    pub exit_price: f64,
    pub exited_qty: u64,
    /// Percent return, one decimal place
    pub pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyReport {
    pub date: NaiveDate,
    /// Closed round trips, by symbol
    pub symbols: Vec<SymbolPnl>,
    /// Symbols entered but never exited
    pub open: Vec<String>,
    pub skipped_lines: usize,
}

impl DailyReport {
    /// Additive total across symbols
    pub fn total_pct(&self) -> f64 {
        round1(self.symbols.iter().map(|s| s.pct).sum())
    }

    pub fn trade_count(&self) -> usize {
        self.symbols.len()
    }
}

impl fmt::Display for DailyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .symbols
            .iter()
            .map(|s| format!("{}: {:+.1}%", s.symbol, s.pct))
            .collect();
        write!(
            f,
            "{:+.1}% ({}): {}",
            self.total_pct(),
            self.trade_count(),
            parts.join(", ")
        )?;
        if !self.open.is_empty() {
            write!(f, " [open: {}]", self.open.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct RoundTrip {
    entry_price: Option<f64>,
    exit_notional: f64,
    exit_qty: u64,
}

pub fn daily_report(body: &str, date: NaiveDate) -> DailyReport {
    let mut trips: BTreeMap<String, RoundTrip> = BTreeMap::new();
    let mut skipped_lines = 0;

    for (index, line) in body.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record = match TradeRecord::parse_line(line) {
            Ok(record) => record,
            Err(e) => {
                warn!(line = index + 1, error = %e, "Skipping unreadable trade log line");
                skipped_lines += 1;
                continue;
            }
        };
        if record.timestamp.date_naive() != date {
            continue;
        }

        match record.tag {
            EventTag::Entry => {
                trips.insert(
                    record.symbol,
                    RoundTrip {
                        entry_price: Some(record.price),
                        ..RoundTrip::default()
                    },
                );
            }
            tag if tag.is_exit() => {
                let trip = trips.entry(record.symbol).or_default();
                trip.exit_notional += record.price * record.qty as f64;
                trip.exit_qty += record.qty;
            }
            _ => {}
        }
    }

    let mut symbols = Vec::new();
    let mut open = Vec::new();
    for (symbol, trip) in trips {
        let Some(entry_price) = trip.entry_price else {
            // Exits without an entry belong to an earlier day's position
            continue;
        };
        if trip.exit_qty == 0 || entry_price <= 0.0 {
            open.push(symbol);
            continue;
        }
        let exit_price = trip.exit_notional / trip.exit_qty as f64;
        symbols.push(SymbolPnl {
            symbol,
            entry_price,
            exit_price,
            exited_qty: trip.exit_qty,
            pct: round1((exit_price / entry_price - 1.0) * 100.0),
        });
    }

    DailyReport {
        date,
        symbols,
        open,
        skipped_lines,
    }
}

pub fn daily_report_from_file(path: impl AsRef<Path>, date: NaiveDate) -> Result<DailyReport, ReportError> {
    let path = path.as_ref();
    let body = std::fs::read_to_string(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(daily_report(&body, date))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
