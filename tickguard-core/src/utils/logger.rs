use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Console log layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Install the global subscriber
///
/// `RUST_LOG` overrides `log_level` when set. Fails if a subscriber is
/// already installed.
pub fn init_logger(log_level: &str, format: LogFormat) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let installed = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_thread_names(true))
            .try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install log subscriber: {}", e))
}
