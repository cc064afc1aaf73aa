//! End-of-day reporting

pub mod pnl;

pub use pnl::{daily_report, daily_report_from_file, DailyReport, ReportError, SymbolPnl};
