use std::env;
use std::io::{self, IsTerminal};
use tracing::debug;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILE: &str = "./logs/projector.log";

/// What the console layer shows for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleMode {
    /// Info lines at `TRACING_LEVEL`.
    Human,
    /// Warnings and errors only; stdout carries machine-readable output.
    Machine,
}

impl ConsoleMode {
    fn filter(self) -> EnvFilter {
        match self {
            ConsoleMode::Human => level_filter(),
            ConsoleMode::Machine => EnvFilter::default().add_directive(LevelFilter::WARN.into()),
        }
    }
}

fn level_filter() -> EnvFilter {
    EnvFilter::new(env::var("TRACING_LEVEL").unwrap_or_else(|_| "info".to_string()))
}

/// Log to stderr and to `LOG_FILE_PATH`, leaving stdout to command output.
/// The file always records at `TRACING_LEVEL`. Keep the returned guard alive
/// so the file writer flushes on exit.
pub fn init_logger(mode: ConsoleMode) -> impl Drop {
    let log_file_path =
        env::var("LOG_FILE_PATH").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());

    let file_appender = tracing_appender::rolling::never("./", log_file_path);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let console = fmt::layer()
        .with_writer(io::stderr)
        .compact()
        .with_target(false)
        .without_time()
        .with_ansi(io::stderr().is_terminal())
        .with_filter(mode.filter());

    let file = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_filter(level_filter());

    tracing_subscriber::registry().with(console).with(file).init();

    debug!("Tracing is configured for stderr ({:?}) and file logging.", mode);

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_console_shows_warnings_only() {
        let filter = ConsoleMode::Machine.filter();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
    }
}
