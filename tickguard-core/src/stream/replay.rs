//! JSON-lines replay of recorded feed events
//!
//! Each non-empty line is one serialized [`FeedEvent`]. Lines already
//! delivered are skipped when the feed reconnects, so a reconnect resumes
//! where the previous session broke off.

use super::{FeedError, FeedEvent, MarketDataFeed};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::{info, warn};

pub struct ReplayFeed {
    path: PathBuf,
    pace: Duration,
    hold_at_end: bool,
    lines: Option<Lines<BufReader<File>>>,
    /// Lines consumed across all sessions
    consumed: usize,
    subscribed: HashSet<String>,
}

impl ReplayFeed {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            pace: Duration::ZERO,
            hold_at_end: true,
            lines: None,
            consumed: 0,
            subscribed: HashSet::new(),
        }
    }

    /// Delay before each event
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    /// End the stream at end of file instead of idling
    pub fn end_at_eof(mut self) -> Self {
        self.hold_at_end = false;
        self
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }
}

#[async_trait]
impl MarketDataFeed for ReplayFeed {
    async fn connect(&mut self) -> Result<(), FeedError> {
        let file = File::open(&self.path)
            .await
            .map_err(|e| FeedError::Connect(format!("{}: {}", self.path.display(), e)))?;
        let mut lines = BufReader::new(file).lines();
        for _ in 0..self.consumed {
            if lines.next_line().await?.is_none() {
                break;
            }
        }
        info!(path = %self.path.display(), resume_at = self.consumed, "Replay opened");
        self.lines = Some(lines);
        Ok(())
    }

    async fn subscribe(&mut self, symbols: &[String]) -> Result<(), FeedError> {
        self.subscribed.extend(symbols.iter().cloned());
        Ok(())
    }

    async fn unsubscribe(&mut self, symbols: &[String]) -> Result<(), FeedError> {
        for symbol in symbols {
            self.subscribed.remove(symbol);
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<FeedEvent>, FeedError> {
        if !self.pace.is_zero() {
            tokio::time::sleep(self.pace).await;
        }

        loop {
            let Some(lines) = self.lines.as_mut() else {
                return Err(FeedError::Disconnected("replay not connected".to_string()));
            };
            let Some(line) = lines.next_line().await? else {
                if self.hold_at_end {
                    info!(events = self.consumed, "Replay exhausted, idling");
                    std::future::pending::<()>().await;
                }
                return Ok(None);
            };
            self.consumed += 1;

            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<FeedEvent>(&line) {
                Ok(event) if self.subscribed.contains(event.symbol()) => return Ok(Some(event)),
                Ok(_) => continue,
                Err(e) => {
                    warn!(line = self.consumed, error = %e, "Skipping malformed replay line");
                }
            }
        }
    }

    async fn close(&mut self) {
        self.lines = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{QuoteEntry, TradeTick};
    use chrono::{TimeZone, Utc};
    use std::io::Write;

    fn write_events(events: &[FeedEvent]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for event in events {
            writeln!(file, "{}", serde_json::to_string(event).unwrap()).unwrap();
        }
        writeln!(file, "not json").unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_replay_filters_and_resumes() {
        let at = Utc.with_ymd_and_hms(2025, 6, 3, 14, 0, 0).unwrap();
        let file = write_events(&[
            FeedEvent::Quote {
                symbol: "ABCD".to_string(),
                quote: QuoteEntry::new(9.99, 10.01, at),
            },
            FeedEvent::Trade(TradeTick::new("WXYZ", 3.0, 100, at)),
            FeedEvent::Trade(TradeTick::new("ABCD", 10.0, 100, at)),
        ]);

        let mut feed = ReplayFeed::new(file.path()).end_at_eof();
        feed.connect().await.unwrap();
        feed.subscribe(&["ABCD".to_string()]).await.unwrap();

        let first = feed.next_event().await.unwrap().unwrap();
        assert!(matches!(first, FeedEvent::Quote { .. }));

        // Reconnect resumes after the delivered line
        feed.close().await;
        feed.connect().await.unwrap();
        let second = feed.next_event().await.unwrap().unwrap();
        assert_eq!(second, FeedEvent::Trade(TradeTick::new("ABCD", 10.0, 100, at)));

        assert!(feed.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_connect_error() {
        let mut feed = ReplayFeed::new("/nonexistent/replay.jsonl");
        assert!(matches!(feed.connect().await, Err(FeedError::Connect(_))));
    }
}
