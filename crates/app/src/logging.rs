//! Log output for the command-line client.
//!
//! Filtering follows `RUST_LOG` when set; otherwise `--verbose` picks between
//! `info` and `debug` for the workspace crates.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const CRATES: [&str; 4] = ["app", "services", "storage", "poll_core"];

fn default_filter(verbose: bool) -> EnvFilter {
    let level = if verbose { "debug" } else { "info" };
    let directives = CRATES
        .iter()
        .map(|name| format!("{name}={level}"))
        .collect::<Vec<_>>()
        .join(",");
    EnvFilter::new(format!("warn,{directives}"))
}

/// Installs the global subscriber. Logs go to stderr so stdout stays readable.
///
/// # Errors
///
/// Fails if a global subscriber is already set.
pub fn init_logging(verbose: bool) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose)
                .compact(),
        )
        .try_init()
}
