//! Process-wide panic hook
//!
//! Routes panic location and message through `tracing` so a crashed
//! per-symbol task leaves a structured log line. The hook does not exit:
//! a panicking monitor task is caught by its `JoinSet` and the rest of the
//! session keeps running.
//!
//! ```no_run
//! use tickguard_core::resilience::install_panic_handler;
//!
//! fn main() {
//!     install_panic_handler();
//!     // ... rest of application
//! }
//! ```

use std::panic;
use tracing::error;

/// Install a panic hook that logs through `tracing`, then delegates to the default hook
pub fn install_panic_handler() {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "<unknown location>".to_string());

        let message = panic_message(panic_info.payload());

        let thread = std::thread::current();
        error!(
            location = %location,
            message = %message,
            thread = thread.name().unwrap_or("<unnamed>"),
            "PANIC"
        );

        // Prints the backtrace if RUST_BACKTRACE=1
        default_hook(panic_info);
    }));

    tracing::info!("Panic handler installed");
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<no message>".to_string()
    }
}
