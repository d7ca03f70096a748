//! Structured logging setup for the command-line tool.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable consulted after `RUST_LOG`.
pub const LOG_ENV: &str = "KASHSHAF_LOG";

/// Initialize the global subscriber. Logs go to stderr so stdout stays
/// clean for JSON and CSV output.
pub fn init_tracing(verbose: bool, log_json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let level = if verbose {
        "kashshaf_mutashabih=debug"
    } else {
        "kashshaf_mutashabih=info"
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env(LOG_ENV))
        .unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);

    if log_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    }

    Ok(())
}
