use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "dataforge.log";

/// Set up the global tracing subscriber: human-readable output on stdout and
/// daily-rotated JSON lines under `logs/`. `RUST_LOG` overrides the default
/// `dataforge=info` filter.
pub fn init_logging() {
    let _ = fs::create_dir_all(LOG_DIR);

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(LOG_DIR, LOG_FILE));

    let filter = EnvFilter::from_default_env().add_directive("dataforge=info".parse().unwrap());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(file_writer))
        .with(fmt::layer().with_writer(std::io::stdout))
        .init();

    // The writer guard must outlive the process or buffered lines are lost.
    std::mem::forget(guard);
}
