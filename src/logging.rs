use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_ENV: &str = "SACRED_BROWSER_LOG";
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Installs the global fmt subscriber. The filter comes from
/// `SACRED_BROWSER_LOG`, then from `directive`, then defaults to `info`.
///
/// Returns false when a subscriber was already installed.
pub fn init_logging(directive: Option<&str>) -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(directive.unwrap_or(DEFAULT_DIRECTIVE)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
