use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "fxtrader=info";

/// File name of the per-instrument log, before the appender's date suffix
pub fn log_file_name(instrument: &str) -> String {
    format!("{}_trader.log", instrument)
}

/// Console plus a daily-rolling per-instrument file
///
/// `RUST_LOG` overrides the default filter. Keep the returned guard alive
/// for the life of the process or buffered file output is lost.
pub fn setup_logging(log_dir: &Path, instrument: &str) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let appender = tracing_appender::rolling::daily(log_dir, log_file_name(instrument));
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name() {
        assert_eq!(log_file_name("EUR_USD"), "EUR_USD_trader.log");
    }
}
