//! Domain-specific error types for position state management
//!
//! Transition errors indicate a logic bug in the caller (an exit requested
//! while flat, an exit larger than the open quantity). They are surfaced to
//! the per-symbol monitor, which terminates that symbol.

use super::position_fsm::Phase;
use thiserror::Error;

/// Errors raised by [`super::position_fsm::PositionState`] transitions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The event is not valid in the current phase
    #[error("invalid transition: {event} while {from}")]
    InvalidTransition {
        /// Phase the machine was in
        from: Phase,
        /// Event that was attempted
        event: &'static str,
    },

    /// Entries and exits must move at least one share
    #[error("quantity must be positive")]
    ZeroQuantity,

    /// Exit quantity exceeds the open quantity
    #[error("exit of {requested} exceeds remaining {remaining}")]
    Overfill {
        /// Quantity requested to close
        requested: u64,
        /// Quantity still open
        remaining: u64,
    },
}
