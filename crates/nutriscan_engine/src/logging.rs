//! Log filter setup for the `nutriscan` binary.

use tracing_subscriber::EnvFilter;

const QUIET_DEPS: &str = "hyper=warn,reqwest=warn";

/// Base level from `NUTRISCAN_LOG_LEVEL`, then `RUST_LOG`, default `info`.
pub fn log_level_with<F>(mut get: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    get("NUTRISCAN_LOG_LEVEL")
        .or_else(|| get("RUST_LOG"))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "info".to_string())
}

/// Filter for `level` with HTTP internals held at `warn`. An unparseable
/// level falls back to `info`.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(format!("{level},{QUIET_DEPS}"))
        .unwrap_or_else(|_| EnvFilter::new(format!("info,{QUIET_DEPS}")))
}

/// Install the compact stderr subscriber. Returns the base level in use.
pub fn init() -> String {
    let level = log_level_with(|k| std::env::var(k).ok());
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_env_filter(env_filter(&level))
        .init();
    level
}
