//! Logging setup for the binary: `RUST_LOG` wins, otherwise the CLI flags pick the level.

use anyhow::{bail, Result};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Resolve the level from `--loglevel`, `--verbose` and `--veryverbose`.
///
/// An explicit `--loglevel` beats the verbosity switches; `-w` beats `-v`.
pub fn level_from_flags(
    loglevel: Option<&str>,
    verbose: bool,
    veryverbose: bool,
) -> Result<LevelFilter> {
    if let Some(name) = loglevel {
        return match name.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LevelFilter::DEBUG),
            "info" => Ok(LevelFilter::INFO),
            "warning" | "warn" => Ok(LevelFilter::WARN),
            "error" => Ok(LevelFilter::ERROR),
            other => bail!("Unrecognized log level '{other}'"),
        };
    }
    if veryverbose {
        Ok(LevelFilter::DEBUG)
    } else if verbose {
        Ok(LevelFilter::INFO)
    } else {
        Ok(LevelFilter::WARN)
    }
}

/// Install the global `fmt` subscriber. Output goes to stderr so it never
/// interleaves with the listing and the prompt on stdout.
pub fn init(level: LevelFilter) {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
