use std::sync::Mutex;

use slog::Drain;
use slog::Fuse;
use slog_async::Async;
use slog_json::Json;

pub use slog::{debug, error, info, o, trace, warn, Discard, Logger};

/// Builds the root logger: JSON lines on stderr, tagged with the build
/// metadata from the `info` crate.
pub fn initialize_logger() -> Logger {
    let drain = Mutex::new(Json::default(std::io::stderr())).map(Fuse);
    let drain = Async::new(drain).build().fuse();

    let logger = Logger::root(
        drain,
        o!("name" => info::NAME, "version" => info::VERSION, "revision" => info::REVISION, "build_timestamp" => info::BUILD_TIMESTAMP),
    );

    #[cfg(feature = "env_logging")]
    let logger = with_env_filter(logger);

    logger
}

/// A logger that drops everything. Used by tests and by callers that
/// don't care about output.
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}

#[cfg(feature = "env_logging")]
fn with_env_filter(logger: Logger) -> Logger {
    let drain = slog_envlogger::new(logger).fuse();
    let logger = Logger::root(drain, o!());

    // the guard lives as long as the process
    std::mem::forget(slog_scope::set_global_logger(logger.clone()));

    logger
}
