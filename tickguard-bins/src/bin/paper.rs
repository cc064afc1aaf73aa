//! Paper trading session - NO REAL ORDERS
//!
//! Replays a recorded JSON-lines event file through the full pipeline:
//! validator, indicators, per-symbol monitors and the in-memory
//! `PaperExecutor`, which fills market orders at the last validated price.
//!
//! ```text
//! tickguard-paper --symbols symbols.json --replay session.jsonl \
//!     --settings settings.json --bars bars/
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tickguard_bins::common::{init_logging, install_shutdown_handler, print_summary, LogArgs};
use tickguard_core::config::{FileConfigSource, SessionSettings};
use tickguard_core::coordinator::{Coordinator, SessionOutcome};
use tickguard_core::data::PriceBook;
use tickguard_core::execution::PaperExecutor;
use tickguard_core::journal::Journal;
use tickguard_core::notify::{LogNotifier, Notifier};
use tickguard_core::resilience::{install_panic_handler, KillSwitch};
use tickguard_core::stream::{BarHistory, FileBarHistory, ReplayFeed};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Replay a session against the paper executor")]
struct Args {
    /// Symbol configuration (JSON array), watched for changes
    #[arg(short, long)]
    symbols: PathBuf,

    /// Recorded feed events (JSON lines)
    #[arg(short, long)]
    replay: PathBuf,

    /// Session settings (JSON); defaults apply when omitted
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Directory of `<SYMBOL>.jsonl` bar files used to seed indicators
    #[arg(long)]
    bars: Option<PathBuf>,

    /// Delay between replayed events in milliseconds
    #[arg(long, default_value = "0")]
    pace_ms: u64,

    /// End the feed at end of file instead of idling until the cutoff
    #[arg(long)]
    stop_at_eof: bool,

    #[command(flatten)]
    log: LogArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log)?;
    install_panic_handler();

    info!("=== tickguard: PAPER TRADING ===");
    warn!("PAPER TRADING MODE - NO REAL ORDERS WILL BE PLACED");

    let settings = match &args.settings {
        Some(path) => SessionSettings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => SessionSettings::default(),
    };
    info!(
        timezone = %settings.timezone,
        eod_cutoff = %settings.eod_cutoff,
        entry_cutoff = ?settings.entry_cutoff,
        day_trade_limit = settings.day_trade_limit,
        "Session settings"
    );

    let (config_source, symbols) = FileConfigSource::open(&args.symbols)
        .with_context(|| format!("failed to load symbols from {}", args.symbols.display()))?;

    let kill_switch = KillSwitch::new();
    install_shutdown_handler(&kill_switch)?;

    let journal = Journal::open(
        &settings.logs.trade_log,
        &settings.logs.tick_log,
        settings.timezone,
    )
    .context("failed to open trade/tick logs")?;
    let (notifier, notifier_task) = Notifier::spawn(LogNotifier, settings.notify_retry.clone());

    let prices = Arc::new(PriceBook::new());
    let executor = Arc::new(PaperExecutor::with_prices(prices.clone()));

    let mut feed = ReplayFeed::new(&args.replay).with_pace(Duration::from_millis(args.pace_ms));
    if args.stop_at_eof {
        feed = feed.end_at_eof();
    }
    let history: Option<Arc<dyn BarHistory>> = args
        .bars
        .as_ref()
        .map(|dir| Arc::new(FileBarHistory::new(dir)) as Arc<dyn BarHistory>);

    let coordinator = Coordinator::new(
        settings,
        symbols,
        executor,
        journal,
        notifier,
        kill_switch,
    )?
    .with_prices(prices);

    let summary = coordinator.run(feed, config_source, history).await?;
    print_summary(&summary);

    notifier_task.abort();
    if let SessionOutcome::Fatal(reason) = summary.outcome {
        anyhow::bail!("session halted: {}", reason);
    }
    Ok(())
}
