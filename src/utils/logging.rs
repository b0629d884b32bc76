use std::{path::Path, sync::LazyLock};

use anyhow::Result;
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::fmt::{format::FmtSpan, writer::MakeWriterExt};

pub const LOG_PREFIX: &str = "chirp";

/// Installs the global subscriber. Logs always go to a daily rotated file under
/// `application_data_path/logs`; the console only receives them when `show_std` is set, since
/// the console is where command output goes.
pub fn enable_logging(
    application_data_path: &Path,
    log_level: Option<LevelFilter>,
    show_std: bool,
) -> Result<()> {
    let appender = tracing_appender::rolling::Builder::new()
        .rotation(Rotation::DAILY)
        .max_log_files(5)
        .filename_prefix(LOG_PREFIX)
        .build(application_data_path.join("logs"))?;

    let stderr = std::io::stderr.with_filter(move |_| show_std);

    let level = log_level
        .map(|v| v.to_string())
        .unwrap_or_else(|| std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(format!(
            "{}={level}",
            env!("CARGO_PKG_NAME").replace("-", "_"),
        )))
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(stderr.and(appender))
        .pretty()
        .init();
    Ok(())
}

/// Installs a trace-level subscriber for tests. Another global subscriber may already be in
/// place, in which case that one keeps receiving the events.
pub static TEST_LOGGING: LazyLock<()> = LazyLock::new(|| {
    if let Err(e) = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::TRACE)
        .with_test_writer()
        .pretty()
        .try_init()
    {
        eprintln!("Test logging not installed: {e}");
    }
});

#[cfg(test)]
mod tests {
    use super::TEST_LOGGING;

    #[test]
    fn test_logging_installs_a_subscriber() {
        *TEST_LOGGING;
        assert!(tracing::dispatcher::has_been_set());
        tracing::info!("test logging is active");
    }
}
