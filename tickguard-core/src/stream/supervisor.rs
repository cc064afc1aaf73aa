//! Feed supervisor with automatic reconnection
//!
//! Owns the one upstream session shared by every symbol. Subscriptions are
//! changed through a cloneable [`SupervisorHandle`]; the supervisor keeps the
//! full set so a reconnected session is re-subscribed before it is read.
//!
//! Disconnects (an error or a clean end of stream) are retried per the
//! configured [`RetryPolicy`]. The attempt counter is reset once a
//! reconnected session delivers its first event. Running out of attempts is
//! fatal for the session; an explicit stop never is.

use super::{FeedError, FeedEvent, MarketDataFeed, MarketRouter};
use crate::monitoring::MetricsRegistry;
use crate::resilience::{Backoff, RetryPolicy};
use std::collections::BTreeSet;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("feed reconnection failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: usize, last_error: String },
}

#[derive(Debug)]
enum Command {
    Subscribe(Vec<String>),
    Unsubscribe(Vec<String>),
    Stop,
}

/// Cloneable control handle; calls after the supervisor exits are no-ops
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    sender: mpsc::UnboundedSender<Command>,
}

impl SupervisorHandle {
    pub fn subscribe(&self, symbols: &[String]) {
        let _ = self.sender.send(Command::Subscribe(symbols.to_vec()));
    }

    pub fn unsubscribe(&self, symbols: &[String]) {
        let _ = self.sender.send(Command::Unsubscribe(symbols.to_vec()));
    }

    pub fn stop(&self) {
        let _ = self.sender.send(Command::Stop);
    }
}

enum Flow {
    Continue,
    Stop,
}

enum SessionEnd {
    Stopped,
    Disconnected(String),
}

pub struct StreamSupervisor<F: MarketDataFeed> {
    feed: F,
    router: MarketRouter,
    policy: RetryPolicy,
    metrics: MetricsRegistry,
    commands: mpsc::UnboundedReceiver<Command>,
    subscriptions: BTreeSet<String>,
}

impl<F: MarketDataFeed> StreamSupervisor<F> {
    pub fn new(
        feed: F,
        router: MarketRouter,
        policy: RetryPolicy,
        metrics: MetricsRegistry,
    ) -> (Self, SupervisorHandle) {
        let (sender, commands) = mpsc::unbounded_channel();
        let supervisor = Self {
            feed,
            router,
            policy,
            metrics,
            commands,
            subscriptions: BTreeSet::new(),
        };
        (supervisor, SupervisorHandle { sender })
    }

    /// Run until stopped or out of reconnection attempts
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        let mut backoff = Backoff::new(self.policy.clone());
        let mut first_session = true;

        loop {
            let last_error = match self.open_session().await {
                Ok(()) => {
                    if first_session {
                        info!(symbols = self.subscriptions.len(), "Feed connected");
                    } else {
                        info!(
                            attempt = backoff.attempt_number(),
                            symbols = self.subscriptions.len(),
                            "Feed reconnected"
                        );
                    }
                    match self.pump(&mut backoff, first_session).await {
                        SessionEnd::Stopped => break,
                        SessionEnd::Disconnected(reason) => reason,
                    }
                }
                Err(e) => e.to_string(),
            };
            first_session = false;
            self.feed.close().await;

            let Some(delay) = backoff.next_delay() else {
                error!(
                    attempts = backoff.attempt_number(),
                    error = %last_error,
                    "Feed reconnection attempts exhausted"
                );
                return Err(SupervisorError::RetriesExhausted {
                    attempts: backoff.attempt_number(),
                    last_error,
                });
            };

            warn!(
                error = %last_error,
                attempt = backoff.attempt_number(),
                delay_ms = delay.as_millis() as u64,
                "Feed disconnected, retrying"
            );
            self.metrics.market().feed_reconnects_total.inc();

            if let Flow::Stop = self.wait_retry(delay).await {
                break;
            }
        }

        self.feed.close().await;
        info!("Feed supervisor stopped");
        Ok(())
    }

    async fn open_session(&mut self) -> Result<(), FeedError> {
        self.feed.connect().await?;
        if !self.subscriptions.is_empty() {
            let symbols: Vec<String> = self.subscriptions.iter().cloned().collect();
            self.feed.subscribe(&symbols).await?;
        }
        Ok(())
    }

    /// Read events until the session breaks or a stop arrives
    async fn pump(&mut self, backoff: &mut Backoff, first_session: bool) -> SessionEnd {
        let mut delivered = first_session;

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => {
                    match self.apply(command, true).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Stop) => return SessionEnd::Stopped,
                        Err(e) => return SessionEnd::Disconnected(e.to_string()),
                    }
                }

                event = self.feed.next_event() => {
                    match event {
                        Ok(Some(event)) => {
                            if !delivered {
                                delivered = true;
                                backoff.reset();
                                debug!("Reconnected session delivering, retry budget reset");
                            }
                            self.route(event);
                        }
                        Ok(None) => return SessionEnd::Disconnected("end of stream".to_string()),
                        Err(e) => return SessionEnd::Disconnected(e.to_string()),
                    }
                }
            }
        }
    }

    /// Sleep out a retry delay while still honouring commands
    async fn wait_retry(&mut self, delay: std::time::Duration) -> Flow {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return Flow::Continue,
                command = self.commands.recv() => {
                    // Not connected; only the bookkeeping changes
                    if let Ok(Flow::Stop) = self.apply(command, false).await {
                        return Flow::Stop;
                    }
                }
            }
        }
    }

    async fn apply(&mut self, command: Option<Command>, connected: bool) -> Result<Flow, FeedError> {
        match command {
            None | Some(Command::Stop) => Ok(Flow::Stop),
            Some(Command::Subscribe(symbols)) => {
                let added: Vec<String> = symbols
                    .into_iter()
                    .filter(|s| self.subscriptions.insert(s.clone()))
                    .collect();
                if connected && !added.is_empty() {
                    self.feed.subscribe(&added).await?;
                }
                debug!(?added, "Subscribed");
                Ok(Flow::Continue)
            }
            Some(Command::Unsubscribe(symbols)) => {
                let removed: Vec<String> = symbols
                    .into_iter()
                    .filter(|s| self.subscriptions.remove(s))
                    .collect();
                if connected && !removed.is_empty() {
                    self.feed.unsubscribe(&removed).await?;
                }
                debug!(?removed, "Unsubscribed");
                Ok(Flow::Continue)
            }
        }
    }

    fn route(&self, event: FeedEvent) {
        if self.subscriptions.contains(event.symbol()) {
            self.router.dispatch(event);
        }
    }
}
