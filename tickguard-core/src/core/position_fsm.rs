//! Per-symbol position lifecycle state machine
//!
//! # State Diagram
//!
//! ```text
//!    WAITING_ENTRY ──────── abandon() ──────────┐
//!          │                                    │
//!       enter()                                 │
//!          ▼                                    ▼
//!     IN_POSITION ──── reduce(all) ────────► CLOSED
//!          │                                 (terminal)
//!     reduce(part)                              ▲
//!          ▼                                    │
//!   PARTIALLY_EXITED ─── reduce(all) ───────────┘
//!          │  ▲
//!          └──┘ reduce(part)
//! ```
//!
//! **Invariants:**
//! - `remaining_qty` strictly decreases across exits
//! - `remaining_qty == 0` exactly when the phase is `CLOSED`
//! - `remaining_qty + sum(exits) == entry_qty`
//! - `CLOSED` is terminal; every further event is rejected
//!
//! # Usage
//!
//! ```
//! use tickguard_core::core::position_fsm::{Phase, PositionState};
//!
//! let mut position = PositionState::new();
//! position.enter(100, 5.10).unwrap();
//! assert_eq!(position.reduce(50).unwrap(), Phase::PartiallyExited);
//! assert_eq!(position.close_remaining().unwrap(), 50);
//! assert_eq!(position.phase(), Phase::Closed);
//! ```

use super::errors::TransitionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a symbol's position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    WaitingEntry,
    InPosition,
    PartiallyExited,
    Closed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::WaitingEntry => "WAITING_ENTRY",
            Phase::InPosition => "IN_POSITION",
            Phase::PartiallyExited => "PARTIALLY_EXITED",
            Phase::Closed => "CLOSED",
        }
    }

    /// True while shares are held
    pub fn is_open(&self) -> bool {
        matches!(self, Phase::InPosition | Phase::PartiallyExited)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position owned exclusively by one symbol's monitor
#[derive(Debug, Clone, PartialEq)]
pub struct PositionState {
    phase: Phase,
    entry_qty: u64,
    remaining_qty: u64,
    entry_price: Option<f64>,
    exits: Vec<u64>,
}

impl Default for PositionState {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionState {
    pub fn new() -> Self {
        Self {
            phase: Phase::WaitingEntry,
            entry_qty: 0,
            remaining_qty: 0,
            entry_price: None,
            exits: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn entry_qty(&self) -> u64 {
        self.entry_qty
    }

    pub fn remaining_qty(&self) -> u64 {
        self.remaining_qty
    }

    pub fn entry_price(&self) -> Option<f64> {
        self.entry_price
    }

    /// Realized exit quantities, in order
    pub fn exits(&self) -> &[u64] {
        &self.exits
    }

    /// True once at least one scale-out has been realized
    pub fn partial_taken(&self) -> bool {
        !self.exits.is_empty()
    }

    /// Transition: WAITING_ENTRY → IN_POSITION
    pub fn enter(&mut self, qty: u64, price: f64) -> Result<(), TransitionError> {
        if self.phase != Phase::WaitingEntry {
            return Err(TransitionError::InvalidTransition {
                from: self.phase,
                event: "enter",
            });
        }
        if qty == 0 {
            return Err(TransitionError::ZeroQuantity);
        }

        self.phase = Phase::InPosition;
        self.entry_qty = qty;
        self.remaining_qty = qty;
        self.entry_price = Some(price);
        Ok(())
    }

    /// Transition: IN_POSITION/PARTIALLY_EXITED → PARTIALLY_EXITED or CLOSED
    ///
    /// Closing exactly the remainder closes the position.
    pub fn reduce(&mut self, qty: u64) -> Result<Phase, TransitionError> {
        if !self.phase.is_open() {
            return Err(TransitionError::InvalidTransition {
                from: self.phase,
                event: "reduce",
            });
        }
        if qty == 0 {
            return Err(TransitionError::ZeroQuantity);
        }
        if qty > self.remaining_qty {
            return Err(TransitionError::Overfill {
                requested: qty,
                remaining: self.remaining_qty,
            });
        }

        self.remaining_qty -= qty;
        self.exits.push(qty);
        self.phase = if self.remaining_qty == 0 {
            Phase::Closed
        } else {
            Phase::PartiallyExited
        };
        Ok(self.phase)
    }

    /// Close whatever is left, returning the quantity closed
    pub fn close_remaining(&mut self) -> Result<u64, TransitionError> {
        let qty = self.remaining_qty;
        self.reduce(qty)?;
        Ok(qty)
    }

    /// Transition: WAITING_ENTRY → CLOSED without ever holding shares
    pub fn abandon(&mut self) -> Result<(), TransitionError> {
        if self.phase != Phase::WaitingEntry {
            return Err(TransitionError::InvalidTransition {
                from: self.phase,
                event: "abandon",
            });
        }
        self.phase = Phase::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_full_lifecycle_with_scale_out() {
        let mut position = PositionState::new();
        assert_eq!(position.phase(), Phase::WaitingEntry);

        position.enter(101, 5.10).unwrap();
        assert_eq!(position.phase(), Phase::InPosition);
        assert_eq!(position.remaining_qty(), 101);

        assert_eq!(position.reduce(51).unwrap(), Phase::PartiallyExited);
        assert!(position.partial_taken());
        assert_eq!(position.remaining_qty(), 50);

        assert_eq!(position.close_remaining().unwrap(), 50);
        assert_eq!(position.phase(), Phase::Closed);
        assert_eq!(position.exits(), &[51, 50]);
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut position = PositionState::new();
        position.enter(10, 1.0).unwrap();
        position.close_remaining().unwrap();

        assert!(matches!(
            position.enter(10, 1.0),
            Err(TransitionError::InvalidTransition { from: Phase::Closed, .. })
        ));
        assert!(position.reduce(1).is_err());
        assert!(position.close_remaining().is_err());
        assert!(position.abandon().is_err());
    }

    #[test]
    fn test_reduce_rejects_overfill_and_zero() {
        let mut position = PositionState::new();
        position.enter(10, 1.0).unwrap();

        assert_eq!(
            position.reduce(11),
            Err(TransitionError::Overfill {
                requested: 11,
                remaining: 10
            })
        );
        assert_eq!(position.reduce(0), Err(TransitionError::ZeroQuantity));
        assert_eq!(position.remaining_qty(), 10);
    }

    #[test]
    fn test_abandon_only_from_waiting() {
        let mut position = PositionState::new();
        position.abandon().unwrap();
        assert_eq!(position.phase(), Phase::Closed);
        assert_eq!(position.remaining_qty(), 0);

        let mut position = PositionState::new();
        position.enter(5, 1.0).unwrap();
        assert!(position.abandon().is_err());
    }

    proptest! {
        #[test]
        fn prop_exits_sum_to_entry(entry in 1u64..10_000, cuts in proptest::collection::vec(1u64..5_000, 0..8)) {
            let mut position = PositionState::new();
            position.enter(entry, 10.0).unwrap();

            let mut last_remaining = entry;
            for cut in cuts {
                if position.phase() == Phase::Closed {
                    break;
                }
                let qty = cut.min(position.remaining_qty());
                position.reduce(qty).unwrap();
                prop_assert!(position.remaining_qty() < last_remaining);
                last_remaining = position.remaining_qty();
            }

            let realized: u64 = position.exits().iter().sum();
            prop_assert_eq!(realized + position.remaining_qty(), entry);
            prop_assert_eq!(position.remaining_qty() == 0, position.phase() == Phase::Closed);
        }
    }
}
