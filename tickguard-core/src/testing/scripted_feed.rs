//! Programmable market data feed for tests
//!
//! The feed is a cloneable handle over a shared script, so a test can keep a
//! copy, hand the other to the coordinator, and keep pushing steps or
//! inspecting connection counts while the session runs. An empty script
//! idles until the next push.

use crate::core::{Bar, QuoteEntry, TradeTick};
use crate::stream::{FeedError, FeedEvent, MarketDataFeed};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone)]
pub enum ScriptStep {
    Event(FeedEvent),
    /// Break the session with an error
    Disconnect(String),
    /// End the stream cleanly
    End,
    Pause(Duration),
}

#[derive(Debug, Default)]
struct ScriptState {
    steps: VecDeque<ScriptStep>,
    connect_failures: usize,
    connects: usize,
    closes: usize,
    subscribed: BTreeSet<String>,
    subscribe_calls: Vec<Vec<String>>,
    delivered: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedFeed {
    state: Arc<Mutex<ScriptState>>,
    pushed: Arc<Notify>,
}

impl ScriptedFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, step: ScriptStep) {
        self.state.lock().steps.push_back(step);
        self.pushed.notify_one();
    }

    pub fn push_event(&self, event: FeedEvent) {
        self.push(ScriptStep::Event(event));
    }

    pub fn push_quote(&self, symbol: &str, quote: QuoteEntry) {
        self.push_event(FeedEvent::Quote {
            symbol: symbol.to_string(),
            quote,
        });
    }

    pub fn push_trade(&self, trade: TradeTick) {
        self.push_event(FeedEvent::Trade(trade));
    }

    pub fn push_bar(&self, symbol: &str, bar: Bar) {
        self.push_event(FeedEvent::Bar {
            symbol: symbol.to_string(),
            bar,
        });
    }

    /// The next `n` connection attempts fail
    pub fn fail_connects(&self, n: usize) {
        self.state.lock().connect_failures = n;
    }

    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    pub fn closes(&self) -> usize {
        self.state.lock().closes
    }

    pub fn subscribed(&self) -> BTreeSet<String> {
        self.state.lock().subscribed.clone()
    }

    pub fn subscribe_calls(&self) -> Vec<Vec<String>> {
        self.state.lock().subscribe_calls.clone()
    }

    pub fn delivered(&self) -> usize {
        self.state.lock().delivered
    }

    pub fn pending(&self) -> usize {
        self.state.lock().steps.len()
    }
}

#[async_trait]
impl MarketDataFeed for ScriptedFeed {
    async fn connect(&mut self) -> Result<(), FeedError> {
        let mut state = self.state.lock();
        state.connects += 1;
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(FeedError::Connect("scripted connect failure".to_string()));
        }
        state.subscribed.clear();
        Ok(())
    }

    async fn subscribe(&mut self, symbols: &[String]) -> Result<(), FeedError> {
        let mut state = self.state.lock();
        state.subscribed.extend(symbols.iter().cloned());
        state.subscribe_calls.push(symbols.to_vec());
        Ok(())
    }

    async fn unsubscribe(&mut self, symbols: &[String]) -> Result<(), FeedError> {
        let mut state = self.state.lock();
        for symbol in symbols {
            state.subscribed.remove(symbol);
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<FeedEvent>, FeedError> {
        loop {
            let step = self.state.lock().steps.pop_front();
            match step {
                None => self.pushed.notified().await,
                Some(ScriptStep::Pause(delay)) => tokio::time::sleep(delay).await,
                Some(ScriptStep::Event(event)) => {
                    self.state.lock().delivered += 1;
                    return Ok(Some(event));
                }
                Some(ScriptStep::Disconnect(reason)) => return Err(FeedError::Disconnected(reason)),
                Some(ScriptStep::End) => return Ok(None),
            }
        }
    }

    async fn close(&mut self) {
        self.state.lock().closes += 1;
    }
}
