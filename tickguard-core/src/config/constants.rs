//! Session defaults and venue constants
//!
//! Runtime-tunable values live in [`super::SessionSettings`]; these are the
//! defaults it falls back to plus the fixed US equity session hours.

use chrono::NaiveTime;

// ===== US EQUITY SESSION HOURS (exchange-local) =====

/// Regular session open, 09:30
pub const REGULAR_OPEN: (u32, u32) = (9, 30);

/// Regular session close, 16:00
pub const REGULAR_CLOSE: (u32, u32) = (16, 0);

/// Pre-market open, 04:00
pub const EXTENDED_OPEN: (u32, u32) = (4, 0);

/// After-hours close, 20:00
pub const EXTENDED_CLOSE: (u32, u32) = (20, 0);

// ===== POSITION STATE MACHINE =====

/// Default end-of-day forced liquidation time, 15:55
pub const DEFAULT_EOD_CUTOFF: (u32, u32) = (15, 55);

/// Default last time a new entry may be opened, 15:25
pub const DEFAULT_ENTRY_CUTOFF: (u32, u32) = (15, 25);

/// Evaluation cadence for each symbol monitor
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;

/// Back-off while waiting for the first validated price
pub const DEFAULT_DATA_RETRY_MS: u64 = 2_000;

/// Dormancy after a SKIP (budget exhausted), 5 hours
pub const DEFAULT_SKIP_DORMANCY_SECS: u64 = 18_000;

/// Entries allowed per session across all symbols
pub const DEFAULT_DAY_TRADE_LIMIT: u32 = 1;

// ===== CONFIGURATION RELOAD =====

/// Poll cadence for the symbols file
pub const DEFAULT_CONFIG_POLL_MS: u64 = 1_000;

/// Consecutive unreadable polls before the session is aborted
pub const DEFAULT_MAX_CONFIG_FAILURES: u32 = 30;

// ===== SHUTDOWN =====

/// Grace period for monitor tasks to acknowledge shutdown before abort
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;

// ===== SYMBOL DEFAULTS =====

/// Default trailing stop, percent
pub const DEFAULT_TRAILING_STOP_PCT: f64 = 5.0;

/// Default position size, dollars
pub const DEFAULT_DOLLAR_VALUE: f64 = 4_000.0;

/// Build a `NaiveTime` from an `(hour, minute)` constant
pub fn hm((hour, minute): (u32, u32)) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_hours_are_ordered() {
        assert!(hm(EXTENDED_OPEN) < hm(REGULAR_OPEN));
        assert!(hm(REGULAR_OPEN) < hm(DEFAULT_ENTRY_CUTOFF));
        assert!(hm(DEFAULT_ENTRY_CUTOFF) < hm(DEFAULT_EOD_CUTOFF));
        assert!(hm(DEFAULT_EOD_CUTOFF) <= hm(REGULAR_CLOSE));
        assert!(hm(REGULAR_CLOSE) < hm(EXTENDED_CLOSE));
    }
}
