//! Diagnostics through `tracing`
//!
//! Events go to stderr so command output on stdout stays clean. The filter
//! comes from `GITC_LOG` (any `EnvFilter` directive); without it the level is
//! `warn`, raised by each `-v` on the command line.

use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_ENV: &str = "GITC_LOG";

/// Default directive for a number of `-v` flags
pub fn level_for_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn filter(verbose: u8) -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::new(level_for_verbosity(verbose)),
    }
}

/// Install the global subscriber; a second call is a no-op
pub fn init_logging(verbose: u8) {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .with_ansi(is_terminal::IsTerminal::is_terminal(&std::io::stderr()));

    // already initialized by an earlier call or a test harness
    let _ = tracing_subscriber::registry()
        .with(layer.with_filter(filter(verbose)))
        .try_init();
}
