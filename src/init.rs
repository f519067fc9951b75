use crate::env::{env_or, LOG_LEVEL_ENV};
use tracing::{warn, Level};

/// Map a level name to a [`Level`], falling back to `INFO` for anything
/// unrecognized.
pub fn parse_level(name: &str) -> Level {
    name.trim().parse::<Level>().unwrap_or(Level::INFO)
}

/// Install the global `tracing` subscriber for the server process.
///
/// **Effects**
///
/// Reads the level from `LOG_LEVEL` (default `info`) and installs a `fmt`
/// subscriber writing uncolored lines with full timestamps to stdout. If
/// a global subscriber is already installed this does nothing beyond a
/// warning on the existing one.
pub fn init_logging() {
    let requested = env_or(LOG_LEVEL_ENV, "info");
    let level = parse_level(&requested);

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .with_target(true)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        warn!("Global tracing subscriber already installed");
    }
}
