use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_ENV: &str = "HOISTPM_LOG";

/// Install the global subscriber. `verbosity` 0 keeps the env filter (default
/// `warn`), 1 enables debug output for this crate, 2+ trace.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let filter = match verbosity {
        0 => filter,
        1 => filter.add_directive(Level::DEBUG.into()),
        _ => filter.add_directive(Level::TRACE.into()),
    };
    // Keep whichever subscriber was installed first.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}
