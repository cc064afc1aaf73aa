//! Common utilities for all binaries
//!
//! Logging setup, shutdown signals and the end-of-session report.

use anyhow::Result;
use clap::Args;
use tickguard_core::coordinator::{SessionOutcome, SessionSummary};
use tickguard_core::engine::ExitKind;
use tickguard_core::resilience::KillSwitch;
use tickguard_core::utils::{init_logger, LogFormat};
use tracing::{error, info, warn};

/// Logging flags shared by every binary
#[derive(Args, Debug)]
pub struct LogArgs {
    /// Log level (RUST_LOG takes precedence)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Emit JSON log lines
    #[arg(long)]
    pub json_logs: bool,
}

/// Initialize tracing/logging
pub fn init_logging(args: &LogArgs) -> Result<()> {
    let format = if args.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_logger(&args.log_level, format)
}

/// Trip the kill switch on Ctrl+C or SIGTERM
pub fn install_shutdown_handler(kill_switch: &KillSwitch) -> Result<()> {
    let kill_switch = kill_switch.clone();
    ctrlc::set_handler(move || {
        warn!("Received shutdown signal, initiating graceful shutdown...");
        kill_switch.shutdown("User requested shutdown (signal)");
    })?;
    Ok(())
}

/// Print final statistics
pub fn print_summary(summary: &SessionSummary) {
    info!("=== Session Summary ===");
    match &summary.outcome {
        SessionOutcome::Completed => info!("Outcome: completed"),
        SessionOutcome::Interrupted(reason) => info!("Outcome: interrupted ({})", reason),
        SessionOutcome::Fatal(reason) => error!("Outcome: FATAL ({})", reason),
    }
    info!("Day trades used: {}", summary.day_trades_used);

    for exit in &summary.exits {
        match &exit.reason {
            ExitKind::Finished(reason) => info!(
                "  {:<6} {:<10} remaining={}",
                exit.symbol,
                reason.as_str(),
                exit.remaining_qty
            ),
            ExitKind::Failed(reason) => warn!(
                "  {:<6} FAILED     remaining={} ({})",
                exit.symbol, exit.remaining_qty, reason
            ),
        }
    }
    for symbol in &summary.aborted {
        warn!("  {:<6} aborted after grace period", symbol);
    }
    for position in &summary.swept {
        info!("  swept {} x{}", position.symbol, position.qty);
    }
}
