//! Daily P/L from the trade log
//!
//! Pairs each symbol's last entry of the day with its quantity-weighted
//! exits and prints one line per symbol plus the additive total.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use std::path::PathBuf;
use tickguard_bins::common::{init_logging, LogArgs};
use tickguard_core::config::SessionSettings;
use tickguard_core::report::daily_report_from_file;

#[derive(Parser, Debug)]
#[command(author, version, about = "Summarize one day of the trade log")]
struct Args {
    /// Trade log; defaults to the path in the session settings
    #[arg(short, long)]
    trade_log: Option<PathBuf>,

    /// Session settings (JSON), for the log path and time zone
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Day to report (YYYY-MM-DD); defaults to today in the exchange time zone
    #[arg(short, long)]
    date: Option<NaiveDate>,

    #[command(flatten)]
    log: LogArgs,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log)?;

    let settings = match &args.settings {
        Some(path) => SessionSettings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => SessionSettings::default(),
    };
    let trade_log = args.trade_log.unwrap_or(settings.logs.trade_log);
    let date = args
        .date
        .unwrap_or_else(|| Utc::now().with_timezone(&settings.timezone).date_naive());

    let report = daily_report_from_file(&trade_log, date)?;

    println!("{} {}", report.date, report);
    for pnl in &report.symbols {
        println!(
            "  {:<6} {:>8} @ {:>9.4} -> {:>9.4}  {:+.1}%",
            pnl.symbol, pnl.exited_qty, pnl.entry_price, pnl.exit_price, pnl.pct
        );
    }
    if report.skipped_lines > 0 {
        eprintln!("{} unreadable lines skipped", report.skipped_lines);
    }
    Ok(())
}
