use crate::error::{CliError, Result};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*};

/// Install the global subscriber. Logs go to stderr so stdout stays clean
/// for JSON output.
pub fn setup_logging(verbosity: u8, quiet: bool) -> Result<()> {
    let level_filter = if quiet {
        LevelFilter::OFF
    } else {
        match verbosity {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(level_filter)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| CliError::Logging(e.to_string()))
}
