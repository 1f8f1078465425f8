//! Logging setup.
//!
//! Maps the CLI `-v` count onto a tracing level filter. `RUST_LOG` always
//! wins when set, so ad-hoc per-module filtering stays available.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `verbose` is the number of `-v` flags: 0 = warn, 1 = info, 2 = debug,
/// 3+ = trace.
pub fn init(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
