//! Logging initialization using the `tracing` ecosystem.
//!
//! Provides:
//! - Console output (colored, human-readable)
//! - File output (daily rotation via `tracing-appender`, written off-thread)
//! - Configurable log level via env var `RUST_LOG` or explicit parameter
//!
//! The file layer is the bot's append-only trade log: every state
//! transition, control message, order and error ends up there.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber.
///
/// Should be called once at program start. The returned guard must be held
/// for the lifetime of the process when `log_dir` is set, otherwise buffered
/// file output is lost on exit.
///
/// # Parameters
///
/// - `log_level`: default level if `RUST_LOG` env var is not set (e.g. `"info"`)
/// - `log_dir`: optional directory for daily-rotating log files
/// - `file_prefix`: log file prefix (e.g. `"trading_bot"`)
pub fn init_logging(log_level: &str, log_dir: Option<&str>, file_prefix: &str) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = fmt::layer().with_target(true).with_ansi(true);

    match log_dir {
        Some(dir) => {
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_prefix));
            let file_layer = fmt::layer().with_writer(writer).with_ansi(false).with_target(true);

            tracing_subscriber::registry().with(env_filter).with(console_layer).with(file_layer).init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(env_filter).with(console_layer).init();
            None
        }
    }
}
