//! Core domain types
//!
//! - `types`: quotes, trades, bars, order acknowledgements
//! - `ring`: fixed-capacity ring buffer used by the quote and bar windows
//! - `position_fsm`: per-symbol position lifecycle
//! - `errors`: transition errors
//! - `clock`: injectable wall clock

pub mod clock;
pub mod errors;
pub mod position_fsm;
pub mod ring;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::TransitionError;
pub use position_fsm::{Phase, PositionState};
pub use ring::RingBuffer;
pub use types::{Bar, ClosedPosition, OrderResult, QuoteEntry, Side, Timeframe, TradeTick};
