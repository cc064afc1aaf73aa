//! Historical bars from JSON-lines files, one file per symbol
//!
//! `<dir>/<SYMBOL>.jsonl` holds one-minute [`Bar`]s. Coarser timeframes are
//! aggregated on read.

use super::{BarHistory, FeedError};
use crate::core::{Bar, Timeframe};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct FileBarHistory {
    dir: PathBuf,
}

impl FileBarHistory {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", symbol))
    }
}

#[async_trait]
impl BarHistory for FileBarHistory {
    async fn get_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        timeframe: Timeframe,
    ) -> Result<Vec<Bar>, FeedError> {
        let path = self.path_for(symbol);
        let body = match tokio::fs::read_to_string(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(symbol, path = %path.display(), "No bar history");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut bars = Vec::new();
        for (index, line) in body.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Bar>(line) {
                Ok(bar) if bar.timestamp >= start && bar.timestamp <= end => bars.push(bar),
                Ok(_) => {}
                Err(e) => warn!(symbol, line = index + 1, error = %e, "Skipping malformed bar"),
            }
        }
        bars.sort_by_key(|bar| bar.timestamp);

        Ok(match timeframe {
            Timeframe::OneMinute => bars,
            other => aggregate(&bars, other),
        })
    }
}

/// Merge consecutive bars into `timeframe` buckets aligned to the epoch
pub fn aggregate(bars: &[Bar], timeframe: Timeframe) -> Vec<Bar> {
    let width = timeframe.duration().num_seconds().max(1);
    let mut out: Vec<Bar> = Vec::new();

    for bar in bars {
        let secs = bar.timestamp.timestamp();
        let bucket_start = secs - secs.rem_euclid(width);
        let Some(bucket_ts) = DateTime::<Utc>::from_timestamp(bucket_start, 0) else {
            continue;
        };

        match out.last_mut() {
            Some(current) if current.timestamp == bucket_ts => {
                let volume = current.volume + bar.volume;
                if volume > 0.0 {
                    current.vwap = (current.vwap * current.volume + bar.vwap * bar.volume) / volume;
                }
                current.high = current.high.max(bar.high);
                current.low = current.low.min(bar.low);
                current.close = bar.close;
                current.volume = volume;
                current.trade_count += bar.trade_count;
            }
            _ => out.push(Bar {
                timestamp: bucket_ts,
                ..*bar
            }),
        }
    }
    out
}
