//! Session kill switch
//!
//! One flag observed by every task in a session: monitors check it before
//! each order and race their sleeps against [`KillSwitch::wait`]; the
//! coordinator trips it on Ctrl-C/SIGTERM, a fatal feed error, or a broken
//! config source.
//!
//! ## Usage
//!
//! ```
//! use tickguard_core::resilience::KillSwitch;
//!
//! let kill_switch = KillSwitch::new();
//! assert!(!kill_switch.should_stop());
//!
//! kill_switch.shutdown("operator request");
//! assert!(kill_switch.should_stop());
//! assert_eq!(kill_switch.shutdown_reason().as_deref(), Some("operator request"));
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;
use tracing::{error, info};

/// Kill switch state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KillSwitchState {
    /// Normal operation
    Running = 0,
    /// Shutting down gracefully
    ShuttingDown = 1,
    /// Shutdown triggered by an unrecoverable error
    Fatal = 2,
}

impl From<u8> for KillSwitchState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::ShuttingDown,
            2 => Self::Fatal,
            _ => Self::Running,
        }
    }
}

/// Cloneable shutdown flag with an async wake-up
#[derive(Clone)]
pub struct KillSwitch {
    state: Arc<AtomicU8>,
    /// Shutdown reason (first one wins)
    shutdown_reason: Arc<parking_lot::Mutex<Option<String>>>,
    shutdown_time: Arc<parking_lot::Mutex<Option<SystemTime>>>,
    notify: Arc<watch::Sender<bool>>,
}

impl KillSwitch {
    /// Create a new kill switch in Running state
    pub fn new() -> Self {
        let (notify, _) = watch::channel(false);
        Self {
            state: Arc::new(AtomicU8::new(KillSwitchState::Running as u8)),
            shutdown_reason: Arc::new(parking_lot::Mutex::new(None)),
            shutdown_time: Arc::new(parking_lot::Mutex::new(None)),
            notify: Arc::new(notify),
        }
    }

    /// True once any shutdown has been requested
    #[inline]
    pub fn should_stop(&self) -> bool {
        !matches!(self.state(), KillSwitchState::Running)
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        matches!(self.state(), KillSwitchState::Running)
    }

    /// Initiate graceful shutdown
    pub fn shutdown(&self, reason: &str) {
        if self.transition(KillSwitchState::ShuttingDown, reason) {
            info!(reason, "Kill switch activated");
        }
    }

    /// Initiate shutdown after an unrecoverable error
    pub fn fatal(&self, reason: &str) {
        if self.transition(KillSwitchState::Fatal, reason) {
            error!(reason, "Kill switch activated by fatal error");
        }
    }

    fn transition(&self, next: KillSwitchState, reason: &str) -> bool {
        let swapped = self
            .state
            .compare_exchange(
                KillSwitchState::Running as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if swapped {
            *self.shutdown_reason.lock() = Some(reason.to_string());
            *self.shutdown_time.lock() = Some(SystemTime::now());
            self.notify.send_replace(true);
        }
        swapped
    }

    /// Resolve once shutdown has been requested
    ///
    /// Cancel-safe; returns immediately if the switch already tripped.
    pub async fn wait(&self) {
        let mut rx = self.notify.subscribe();
        if self.should_stop() {
            return;
        }
        // The sender lives as long as self, so this only errors on teardown.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    pub fn state(&self) -> KillSwitchState {
        self.state.load(Ordering::Acquire).into()
    }

    pub fn shutdown_reason(&self) -> Option<String> {
        self.shutdown_reason.lock().clone()
    }

    pub fn shutdown_time(&self) -> Option<SystemTime> {
        *self.shutdown_time.lock()
    }
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KillSwitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KillSwitch")
            .field("state", &self.state())
            .field("reason", &self.shutdown_reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_kill_switch_creation() {
        let ks = KillSwitch::new();
        assert!(ks.is_running());
        assert!(!ks.should_stop());
    }

    #[test]
    fn test_graceful_shutdown() {
        let ks = KillSwitch::new();

        ks.shutdown("Test shutdown");

        assert!(ks.should_stop());
        assert_eq!(ks.state(), KillSwitchState::ShuttingDown);
        assert_eq!(ks.shutdown_reason(), Some("Test shutdown".to_string()));
        assert!(ks.shutdown_time().is_some());
    }

    #[test]
    fn test_first_reason_wins() {
        let ks = KillSwitch::new();

        ks.fatal("feed retries exhausted");
        ks.shutdown("SIGTERM");

        assert_eq!(ks.state(), KillSwitchState::Fatal);
        assert_eq!(ks.shutdown_reason().as_deref(), Some("feed retries exhausted"));
    }

    #[test]
    fn test_clones_share_state() {
        let ks = KillSwitch::new();
        let ks_clone = ks.clone();

        let handle = std::thread::spawn(move || {
            ks_clone.shutdown("from thread");
        });
        handle.join().unwrap();

        assert!(ks.should_stop());
    }

    #[tokio::test]
    async fn test_wait_wakes_on_shutdown() {
        let ks = KillSwitch::new();
        let waiter = {
            let ks = ks.clone();
            tokio::spawn(async move { ks.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        ks.shutdown("done");
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_tripped() {
        let ks = KillSwitch::new();
        ks.shutdown("early");
        tokio::time::timeout(Duration::from_millis(100), ks.wait())
            .await
            .unwrap();
    }
}
