//! Stderr logger for the camlab binaries.
//!
//! Every record is printed as `[elapsed LEVEL target] message`. Install it
//! once at startup with [`init_with_level`]; with the `tracing` feature,
//! [`init_tracing`] installs a `tracing-subscriber` instead.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

struct StderrLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let target = record.target().split("::").next().unwrap_or("");
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:8.3}s {:>5} {}] {}",
            elapsed,
            record.level(),
            target,
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger with the given level filter.
///
/// Subsequent calls keep the first logger and return `Ok(())`.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| StderrLogger {
        level,
        started: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

/// Map a `-v` count to a level filter: 0 = info, 1 = debug, 2+ = trace.
pub fn level_from_verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Install a `tracing` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Fails when a global subscriber or `log` logger is already set.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE);
    if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_from_verbosity(0), LevelFilter::Info);
        assert_eq!(level_from_verbosity(1), LevelFilter::Debug);
        assert_eq!(level_from_verbosity(7), LevelFilter::Trace);
    }

    #[test]
    fn second_init_is_a_no_op() {
        assert!(init_with_level(LevelFilter::Warn).is_ok());
        assert!(init_with_level(LevelFilter::Trace).is_ok());
    }
}
