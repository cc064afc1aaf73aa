//! Best-effort push notifications
//!
//! Monitors call [`Notifier::push_note`], which never blocks and never fails.
//! A single delivery task sends notes in order through a [`NoteTransport`],
//! retrying per the configured [`RetryPolicy`]; a note that still cannot be
//! delivered is written to the log instead.

use crate::resilience::{Backoff, RetryPolicy};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait NoteTransport: Send + Sync {
    async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError>;
}

/// Transport that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NoteTransport for LogNotifier {
    async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        info!(title, body, "Notification");
        Ok(())
    }
}

enum NoteCommand {
    Note { title: String, body: String },
    Flush(oneshot::Sender<()>),
}

/// Cloneable handle to the delivery task
#[derive(Clone)]
pub struct Notifier {
    sender: mpsc::UnboundedSender<NoteCommand>,
}

impl Notifier {
    /// Start the delivery task; it ends once every handle is dropped
    pub fn spawn<T>(transport: T, policy: RetryPolicy) -> (Self, JoinHandle<()>)
    where
        T: NoteTransport + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(delivery_loop(transport, policy, receiver));
        (Self { sender }, handle)
    }

    pub fn push_note(&self, title: impl Into<String>, body: impl Into<String>) {
        let title = title.into();
        let body = body.into();
        if let Err(mpsc::error::SendError(NoteCommand::Note { title, body })) =
            self.sender.send(NoteCommand::Note { title, body })
        {
            warn!(title = %title, body = %body, "Notifier stopped, note logged only");
        }
    }

    /// Wait until every note pushed so far has been delivered or given up on
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(NoteCommand::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}

async fn delivery_loop<T: NoteTransport>(
    transport: T,
    policy: RetryPolicy,
    mut receiver: mpsc::UnboundedReceiver<NoteCommand>,
) {
    while let Some(command) = receiver.recv().await {
        match command {
            NoteCommand::Note { title, body } => {
                deliver(&transport, &policy, &title, &body).await;
            }
            NoteCommand::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

async fn deliver<T: NoteTransport>(transport: &T, policy: &RetryPolicy, title: &str, body: &str) {
    let mut backoff = Backoff::new(policy.clone());
    loop {
        match transport.send(title, body).await {
            Ok(()) => return,
            Err(e) => match backoff.next_delay() {
                Some(delay) => {
                    warn!(
                        title,
                        attempt = backoff.attempt_number(),
                        error = %e,
                        "Notification failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    warn!(title, body, error = %e, "Notification undeliverable, logged only");
                    return;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Flaky {
        failures_left: Arc<AtomicUsize>,
        attempts: Arc<AtomicUsize>,
        delivered: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl NoteTransport for Flaky {
        async fn send(&self, title: &str, _body: &str) -> Result<(), NotifyError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(NotifyError::Transport("offline".to_string()));
            }
            self.delivered.lock().push(title.to_string());
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_delivers() {
        let transport = Flaky::default();
        transport.failures_left.store(2, Ordering::SeqCst);
        let (notifier, _handle) =
            Notifier::spawn(transport.clone(), RetryPolicy::fixed(Duration::from_secs(10), 5));

        notifier.push_note("ENTRY", "ABCD 800 @ 5.10");
        notifier.flush().await;

        assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(*transport.delivered.lock(), vec!["ENTRY".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_budget() {
        let transport = Flaky::default();
        transport.failures_left.store(usize::MAX, Ordering::SeqCst);
        let (notifier, _handle) =
            Notifier::spawn(transport.clone(), RetryPolicy::fixed(Duration::from_secs(10), 5));

        notifier.push_note("EXIT", "ABCD");
        notifier.push_note("EOD EXIT", "WXYZ");
        notifier.flush().await;

        // 1 try + 5 retries per note
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 12);
        assert!(transport.delivered.lock().is_empty());
    }

    #[tokio::test]
    async fn test_task_ends_when_handles_dropped() {
        let (notifier, handle) = Notifier::spawn(LogNotifier, RetryPolicy::notification());
        notifier.push_note("title", "body");
        drop(notifier);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
