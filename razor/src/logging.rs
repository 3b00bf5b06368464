//! Thin wrapper around `slog`, in the style of the rest of this lineage's
//! `logging` modules: re-export what call sites need so nobody outside this
//! module has to depend on `slog` directly, and provide a `root` constructor
//! that builds a drain from a `LoggingConfig`.

pub use slog::{debug, error, info, o, trace, warn, Discard, Logger};

use crate::config::LoggingConfig;
use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::Build;

/// Builds the root logger for a `Razor` instance from the supplied config.
/// Falls back to a discarding logger if the drain cannot be built, since a
/// logging failure must never take down the simulation.
pub fn root(config: &LoggingConfig) -> Logger {
    let mut builder = TerminalLoggerBuilder::new();
    builder.level(if config.verbose {
        Severity::Trace
    } else {
        Severity::Info
    });
    builder.destination(Destination::Stderr);

    match builder.build() {
        Ok(logger) => logger,
        Err(_) => Logger::root(Discard, o!()),
    }
}

/// A logger that discards everything. Used by tests and by embeddings that
/// don't want to configure logging at all.
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}
