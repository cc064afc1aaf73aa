//! Resilience patterns
//!
//! - Bounded retry policy shared by the feed supervisor and notifier
//! - Session kill switch
//! - Logging panic hook

pub mod backoff;
pub mod kill_switch;
pub mod panic;

pub use backoff::{Backoff, RetryPolicy};
pub use kill_switch::{KillSwitch, KillSwitchState};
pub use panic::{install_panic_handler, panic_message};
