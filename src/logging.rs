use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

const LOG_FILE_NAME: &str = "skillpath.log";

/// Stdout logging always; a daily-rotated file sink when the config names a
/// log directory. The returned guard must live as long as the process for the
/// file sink to flush.
pub fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let base = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true));

    let Some(dir) = config.log_dir.as_deref() else {
        base.init();
        return None;
    };

    if let Err(err) = std::fs::create_dir_all(dir) {
        base.init();
        tracing::warn!(dir, error = %err, "log directory unavailable, file sink disabled");
        return None;
    }

    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    base.with(fmt::layer().with_writer(writer).with_ansi(false))
        .init();
    Some(guard)
}
